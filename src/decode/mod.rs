pub mod batch;
pub mod convert;
pub mod fixed;
pub mod sink;
pub mod source;

pub use batch::{batched, Batches};
pub use convert::{convert, convert_reader, preflight, ConvertOptions, ConvertSummary, Preflight};
pub use fixed::{decode, decode_line, DecodedRow, FixedWidthDecoder, Header};
pub use sink::{open_sink, CsvSink, OutputFormat, ParquetSink, TableSink};
pub use source::{first_line, with_source};
