// ==========================================
// 蜡烛烛芯推荐系统 - 导入层
// ==========================================
// 职责: 产品目录 / ERP BOM 导出 → 参考数据表
// 支持: Excel, CSV
// ==========================================

pub mod error;
pub mod file_parser;
pub mod reference_importer;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRow, UniversalFileParser};
pub use reference_importer::{ImportReport, ReferenceImporter, ReferenceKind, RowError};
