//! Intra-alignment variant discovery for assembly-based variant calling.
//!
//! Variants contained in single alignment records between a query assembly and
//! a reference genome are called from the per-record operation streams: SNVs
//! and INS/DEL (including SV-sized events) come directly from the operations,
//! while inversions traversed without splitting the alignment leave a
//! signature of matched INS/DEL pairs and SNV/indel clusters that is first
//! flagged ([`call::intra::variant_flag_inv`]) and then confirmed with a
//! kernel density estimate over forward and reverse k-mers
//! ([`call::intra::variant_tables_inv`]).
//!
//! The pipeline is chromosome-partitioned: every chromosome is processed as an
//! independent task and the per-chromosome tables are concatenated in
//! chromosome order, optionally spilling each partition to a columnar file to
//! bound memory on divergent genomes.

pub mod align;
pub mod call;
pub mod inv;
pub mod kde;
pub mod kmer;
pub mod params;
pub mod seq;
