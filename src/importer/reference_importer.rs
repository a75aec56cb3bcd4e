// ==========================================
// 蜡烛烛芯推荐系统 - 参考数据导入器
// ==========================================
// 职责: 原始行 → 领域实体 → 校验 → UPSERT
// 覆盖: 容器 / 蜡 / 香精 / 烛芯 / 配方 / 换蜡增量 / ERP 成品 BOM
// 红线: 单行失败只记入报告, 不中断整批导入
// 约定: 列名即领域字段名（表头大小写不敏感）, 行号从 2 起算（第 1 行为表头）
// ==========================================

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::assembly::{Assembly, CatalogAssembly, WaxConversionDelta};
use crate::domain::component::{FragranceOil, Vessel, WaxType, Wick};
use crate::domain::types::{DensityRating, WaxBaseType};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{RawRow, UniversalFileParser};
use crate::repository::{AssemblyRepository, ComponentRepository};

/// 参考数据类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Vessels,
    WaxTypes,
    FragranceOils,
    Wicks,
    Assemblies,
    WaxConversions,
    CatalogAssemblies,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// 导入报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub kind: ReferenceKind,
    pub total_rows: usize,
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

// ==========================================
// 行读取辅助
// ==========================================

/// 单行视图: 统一处理空值、别名与类型转换
struct RowReader<'a> {
    row: usize,
    raw: &'a RawRow,
}

impl<'a> RowReader<'a> {
    fn new(row: usize, raw: &'a RawRow) -> Self {
        Self { row, raw }
    }

    /// 取第一个非空的列（按别名顺序）
    fn opt(&self, names: &[&str]) -> Option<&'a str> {
        names
            .iter()
            .filter_map(|name| self.raw.get(*name))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    fn opt_string(&self, name: &str) -> Option<String> {
        self.opt(&[name]).map(str::to_string)
    }

    fn required(&self, names: &[&str]) -> ImportResult<&'a str> {
        self.opt(names).ok_or_else(|| ImportError::MissingField {
            row: self.row,
            field: names[0].to_string(),
        })
    }

    fn parse<T: FromStr>(&self, field: &str, value: &str) -> ImportResult<T>
    where
        T::Err: std::fmt::Display,
    {
        value
            .parse::<T>()
            .map_err(|e| ImportError::TypeConversionError {
                row: self.row,
                field: field.to_string(),
                message: format!("{} ({})", e, value),
            })
    }

    fn required_f64(&self, name: &str) -> ImportResult<f64> {
        let value = self.required(&[name])?;
        self.parse(name, value)
    }

    fn opt_f64(&self, name: &str) -> ImportResult<Option<f64>> {
        self.opt(&[name]).map(|v| self.parse(name, v)).transpose()
    }

    fn f64_or(&self, name: &str, default: f64) -> ImportResult<f64> {
        Ok(self.opt_f64(name)?.unwrap_or(default))
    }

    fn required_i64(&self, name: &str) -> ImportResult<i64> {
        let value = self.required(&[name])?;
        self.parse(name, value)
    }

    fn required_i32(&self, name: &str) -> ImportResult<i32> {
        let value = self.required(&[name])?;
        self.parse(name, value)
    }

    /// 布尔: true/false/1/0/yes/no/y/n; 缺省为 false
    fn bool_or_false(&self, name: &str) -> ImportResult<bool> {
        match self.opt(&[name]) {
            None => Ok(false),
            Some(v) => match v.to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Ok(true),
                "false" | "0" | "no" | "n" => Ok(false),
                _ => Err(ImportError::TypeConversionError {
                    row: self.row,
                    field: name.to_string(),
                    message: format!("无法识别的布尔值: {}", v),
                }),
            },
        }
    }

    /// 日期: RFC3339 或 YYYY-MM-DD（按 UTC 零点）
    fn opt_datetime(&self, name: &str) -> ImportResult<Option<DateTime<Utc>>> {
        let Some(value) = self.opt(&[name]) else {
            return Ok(None);
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Some(naive.and_utc()))
            .ok_or_else(|| ImportError::TypeConversionError {
                row: self.row,
                field: name.to_string(),
                message: format!("日期格式应为 RFC3339 或 YYYY-MM-DD: {}", value),
            })
    }

    fn validated<T>(&self, result: Result<T, String>) -> ImportResult<T> {
        result.map_err(|message| ImportError::ValidationError {
            row: self.row,
            message,
        })
    }
}

// ==========================================
// 行 → 实体映射
// ==========================================

fn map_vessel(r: &RowReader) -> ImportResult<Vessel> {
    let vessel = Vessel {
        id: r.required(&["id"])?.to_string(),
        item_id: r.opt_string("item_id"),
        name: r.required(&["name"])?.to_string(),
        volume_ml: r.required_f64("volume_ml")?,
        diameter_mm: r.required_f64("diameter_mm")?,
        height_mm: r.required_f64("height_mm")?,
        shape: r.opt_string("shape"),
        material: r.opt_string("material"),
        double_wick: r.bool_or_false("double_wick")?,
        heat_dissipation_factor: r.f64_or("heat_dissipation_factor", 1.0)?,
    };
    r.validated(vessel.validate())?;
    Ok(vessel)
}

fn map_wax_type(r: &RowReader) -> ImportResult<WaxType> {
    let wax = WaxType {
        id: r.required(&["id"])?.to_string(),
        name: r.required(&["name"])?.to_string(),
        melt_point_celsius: r.required_f64("melt_point_celsius")?,
        viscosity_index: r.required_f64("viscosity_index")?,
        base_type: WaxBaseType::from_str(r.opt(&["base_type"]).unwrap_or("other")),
    };
    r.validated(wax.validate())?;
    Ok(wax)
}

fn map_fragrance(r: &RowReader) -> ImportResult<FragranceOil> {
    let fragrance = FragranceOil {
        id: r.required(&["id"])?.to_string(),
        item_id: r.opt_string("item_id"),
        name: r.required(&["name"])?.to_string(),
        flash_point_celsius: r.required_f64("flash_point_celsius")?,
        specific_gravity: r.opt_f64("specific_gravity")?,
        max_load_percentage: r.opt_f64("max_load_percentage")?,
        heat_index: r.f64_or("heat_index", 0.0)?,
        category: r.opt(&["category", "fragrance_category"]).map(str::to_string),
        density_rating: r
            .opt(&["density_rating"])
            .map(DensityRating::from_str)
            .unwrap_or_default(),
    };
    r.validated(fragrance.validate())?;
    Ok(fragrance)
}

fn map_wick(r: &RowReader) -> ImportResult<Wick> {
    let wick = Wick {
        id: r.required(&["id"])?.to_string(),
        name: r.required(&["name"])?.to_string(),
        series: r.required(&["series"])?.to_string(),
        size: r.opt_f64("size")?,
        size_index: r.required_i32("size_index")?,
    };
    r.validated(wick.validate())?;
    Ok(wick)
}

fn map_assembly(r: &RowReader) -> ImportResult<Assembly> {
    let fragrance_load_percentage = r.opt_f64("fragrance_load_percentage")?;
    if let Some(load) = fragrance_load_percentage {
        if !(0.0..=100.0).contains(&load) {
            return Err(ImportError::ValidationError {
                row: r.row,
                message: format!("加香比例超出范围 [0, 100]: {}", load),
            });
        }
    }
    Ok(Assembly {
        id: r.required(&["id"])?.to_string(),
        name: r.required(&["name"])?.to_string(),
        vessel_id: r.required(&["vessel_id"])?.to_string(),
        wax_type_id: r.required(&["wax_type_id"])?.to_string(),
        fragrance_oil_id: r.required(&["fragrance_oil_id", "fragrance_id"])?.to_string(),
        fragrance_load_percentage,
        wick_id: r.opt(&["wick_id", "wick_id_1"]).map(str::to_string),
        approved_date: r.opt_datetime("approved_date")?,
        status: r.opt_string("status"),
    })
}

fn map_wax_conversion(r: &RowReader) -> ImportResult<WaxConversionDelta> {
    let confidence_score = r.f64_or("confidence_score", 0.0)?;
    if !(0.0..=1.0).contains(&confidence_score) {
        return Err(ImportError::ValidationError {
            row: r.row,
            message: format!("置信度超出范围 [0, 1]: {}", confidence_score),
        });
    }
    let sample_count = r.required_i64("sample_count")?;
    if sample_count < 0 {
        return Err(ImportError::ValidationError {
            row: r.row,
            message: format!("样本数不能为负: {}", sample_count),
        });
    }
    Ok(WaxConversionDelta {
        vessel_id: r.required(&["vessel_id"])?.to_string(),
        old_wax_type_id: r.required(&["old_wax_type_id"])?.to_string(),
        new_wax_type_id: r.required(&["new_wax_type_id"])?.to_string(),
        wick_size_delta: r.required_i32("wick_size_delta")?,
        confidence_score,
        sample_count,
    })
}

fn map_catalog_assembly(r: &RowReader) -> ImportResult<CatalogAssembly> {
    Ok(CatalogAssembly {
        item_id: r.required(&["item_id", "itemid"])?.to_string(),
        display_name: r.required(&["display_name", "displayname"])?.to_string(),
        oz_fill: r.opt_f64("oz_fill")?,
    })
}

// ==========================================
// ReferenceImporter
// ==========================================
pub struct ReferenceImporter {
    component_repo: ComponentRepository,
    assembly_repo: AssemblyRepository,
}

impl ReferenceImporter {
    pub fn new(component_repo: ComponentRepository, assembly_repo: AssemblyRepository) -> Self {
        Self {
            component_repo,
            assembly_repo,
        }
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::new(
            ComponentRepository::from_connection(conn.clone()),
            AssemblyRepository::from_connection(conn),
        )
    }

    /// 解析文件并导入
    ///
    /// 文件级错误（不存在/格式不支持/解析失败）直接返回; 行级错误进入报告
    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub fn import_file<P: AsRef<Path>>(
        &self,
        kind: ReferenceKind,
        file_path: P,
    ) -> ImportResult<ImportReport> {
        let rows = UniversalFileParser.parse(file_path.as_ref())?;
        Ok(self.import_records(kind, &rows))
    }

    /// 导入已解析的原始行
    pub fn import_records(&self, kind: ReferenceKind, rows: &[RawRow]) -> ImportReport {
        let mut report = ImportReport {
            kind,
            total_rows: rows.len(),
            imported: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (idx, raw) in rows.iter().enumerate() {
            let reader = RowReader::new(idx + 2, raw);
            match self.import_row(kind, &reader) {
                Ok(()) => report.imported += 1,
                Err(e) => {
                    warn!(?kind, row = reader.row, error = %e, "导入行失败");
                    report.failed += 1;
                    report.errors.push(RowError {
                        row: reader.row,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            ?kind,
            total = report.total_rows,
            imported = report.imported,
            failed = report.failed,
            "参考数据导入完成"
        );
        report
    }

    fn import_row(&self, kind: ReferenceKind, r: &RowReader) -> ImportResult<()> {
        match kind {
            ReferenceKind::Vessels => self.component_repo.upsert_vessel(&map_vessel(r)?)?,
            ReferenceKind::WaxTypes => self.component_repo.upsert_wax_type(&map_wax_type(r)?)?,
            ReferenceKind::FragranceOils => {
                self.component_repo.upsert_fragrance(&map_fragrance(r)?)?
            }
            ReferenceKind::Wicks => self.component_repo.upsert_wick(&map_wick(r)?)?,
            ReferenceKind::Assemblies => self.assembly_repo.upsert_assembly(&map_assembly(r)?)?,
            ReferenceKind::WaxConversions => self
                .assembly_repo
                .upsert_wax_conversion_delta(&map_wax_conversion(r)?)?,
            ReferenceKind::CatalogAssemblies => self
                .assembly_repo
                .upsert_catalog_assembly(&map_catalog_assembly(r)?)?,
        }
        Ok(())
    }
}
