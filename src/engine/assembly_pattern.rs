// ==========================================
// 蜡烛烛芯推荐系统 - 成品配方匹配策略
// ==========================================
// 职责: 在外部成品目录（ERP BOM）中查找同容器+同香精的已批准成品,
//       从成品名称/物料号中提取烛芯型号
// 红线: 目录不可用 = 策略跳过, 不是失败
// 红线: 烛芯系列识别由前缀表驱动, 新系列只改数据
// ==========================================

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use regex::{Regex, RegexBuilder};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::engine_config::{default_series_prefixes, SeriesPrefixRule};
use crate::domain::assembly::CatalogAssembly;
use crate::domain::recommendation::WickRecommendation;
use crate::engine::store::AttributeStore;
use crate::repository::{AssemblyRepository, RepositoryResult};

/// 成品匹配基础置信度
pub const ASSEMBLY_BASE_CONFIDENCE: f64 = 0.95;
/// 带灌装量时的置信度上限
pub const ASSEMBLY_CONFIDENCE_CAP: f64 = 0.98;

/// 名称中需要剥离的物料前缀
const STRIP_PREFIXES: [&str; 4] = ["ves-", "oil-", "fo-", "frag-"];

// ==========================================
// AssemblyCatalog - 外部成品目录
// ==========================================

pub trait AssemblyCatalog: Send + Sync {
    /// 目录是否已配置（未配置时策略直接跳过）
    fn is_configured(&self) -> bool;

    fn assembly_items(&self) -> RepositoryResult<Vec<CatalogAssembly>>;
}

/// 内存成品目录
#[derive(Debug, Clone, Default)]
pub struct StaticAssemblyCatalog {
    items: Vec<CatalogAssembly>,
}

impl StaticAssemblyCatalog {
    pub fn new(items: Vec<CatalogAssembly>) -> Self {
        Self { items }
    }
}

impl AssemblyCatalog for StaticAssemblyCatalog {
    fn is_configured(&self) -> bool {
        true
    }

    fn assembly_items(&self) -> RepositoryResult<Vec<CatalogAssembly>> {
        Ok(self.items.clone())
    }
}

/// catalog_assemblies 表上的成品目录（由导入器从 BOM 导出文件写入）
pub struct SqliteAssemblyCatalog {
    repo: AssemblyRepository,
}

impl SqliteAssemblyCatalog {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            repo: AssemblyRepository::from_connection(conn),
        }
    }
}

impl AssemblyCatalog for SqliteAssemblyCatalog {
    /// 表中有数据才视为已配置
    fn is_configured(&self) -> bool {
        match self.repo.count_catalog_assemblies() {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(error = %e, "成品目录计数失败, 视为未配置");
                false
            }
        }
    }

    fn assembly_items(&self) -> RepositoryResult<Vec<CatalogAssembly>> {
        self.repo.list_catalog_assemblies()
    }
}

// ==========================================
// SeriesPrefixTable - 烛芯系列前缀表
// ==========================================

#[derive(Debug, Clone)]
struct CompiledRule {
    series: String,
    pattern: Regex,
}

/// 编译后的系列前缀表
#[derive(Debug, Clone)]
pub struct SeriesPrefixTable {
    rules: Vec<CompiledRule>,
}

impl SeriesPrefixTable {
    /// 编译规则（大小写不敏感）; 无法编译的规则记录告警后跳过
    ///
    /// 没有任何规则可用时回退到默认表
    pub fn from_rules(rules: &[SeriesPrefixRule]) -> Self {
        let compiled = compile_rules(rules);
        if !compiled.is_empty() {
            return Self { rules: compiled };
        }

        warn!(configured = rules.len(), "烛芯系列前缀规则均不可用, 回退到默认前缀表");
        Self {
            rules: compile_rules(&default_series_prefixes()),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 从文本中提取烛芯型号（如 "CD-12"）, 按规则顺序、出现顺序返回
    pub fn extract_designators(&self, text: &str) -> Vec<String> {
        let mut designators = Vec::new();
        for rule in &self.rules {
            for caps in rule.pattern.captures_iter(text) {
                if let Some(size) = caps.get(1) {
                    designators.push(format!("{}-{}", rule.series, size.as_str()));
                }
            }
        }
        designators
    }
}

impl Default for SeriesPrefixTable {
    fn default() -> Self {
        Self::from_rules(&default_series_prefixes())
    }
}

fn compile_rules(rules: &[SeriesPrefixRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| {
            match RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(pattern) => Some(CompiledRule {
                    series: rule.series.to_uppercase(),
                    pattern,
                }),
                Err(e) => {
                    warn!(series = %rule.series, pattern = %rule.pattern, error = %e, "烛芯系列前缀规则无效, 已跳过");
                    None
                }
            }
        })
        .collect()
}

// ==========================================
// 纯函数
// ==========================================

/// 提取名称关键词
///
/// 小写, 剥离物料前缀, '-' / '_' 视为分隔符, 只保留长度 ≥ 3 的词
pub fn extract_keywords(name: &str) -> Vec<String> {
    let mut cleaned = name.to_lowercase();
    for prefix in STRIP_PREFIXES {
        cleaned = cleaned.replace(prefix, "");
    }
    cleaned
        .replace(['-', '_'], " ")
        .split_whitespace()
        .filter(|word| word.chars().count() >= 3)
        .map(|word| word.to_string())
        .collect()
}

/// 成品匹配置信度
///
/// 双匹配 0.95, 单匹配 0.95×0.8, 无匹配 0.95×0.6; 有灌装量再 +0.05（上限 0.98）
pub fn calculate_assembly_confidence(
    vessel_match: bool,
    fragrance_match: bool,
    oz_fill: Option<f64>,
) -> f64 {
    let mut confidence = if vessel_match && fragrance_match {
        ASSEMBLY_BASE_CONFIDENCE
    } else if vessel_match || fragrance_match {
        ASSEMBLY_BASE_CONFIDENCE * 0.8
    } else {
        ASSEMBLY_BASE_CONFIDENCE * 0.6
    };

    if oz_fill.map(|oz| oz != 0.0).unwrap_or(false) {
        confidence = (confidence + 0.05).min(ASSEMBLY_CONFIDENCE_CAP);
    }
    confidence
}

/// 由型号合成烛芯 id（"CD-12" → "wick_cd_12"）
pub fn synthesized_wick_id(designator: &str) -> String {
    format!("wick_{}", designator.to_lowercase().replace('-', "_"))
}

/// 已验证组合中提取到的烛芯
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenWick {
    pub designator: String,
    pub confidence: f64,
    pub reasoning: String,
}

// ==========================================
// AssemblyPatternMatcher - 成品名称匹配
// ==========================================

pub struct AssemblyPatternMatcher {
    table: SeriesPrefixTable,
    max_matches: usize,
}

impl AssemblyPatternMatcher {
    pub fn new(table: SeriesPrefixTable, max_matches: usize) -> Self {
        Self { table, max_matches }
    }

    /// 在成品列表中找出同容器+同香精的组合, 按型号去重, 置信度降序, 截断
    pub fn analyze(
        &self,
        items: &[CatalogAssembly],
        vessel_name: &str,
        fragrance_name: &str,
    ) -> Vec<ProvenWick> {
        let vessel_keywords = extract_keywords(vessel_name);
        let fragrance_keywords = extract_keywords(fragrance_name);

        let mut proven = Vec::new();
        for item in items {
            let display = item.display_name.to_lowercase();
            let item_id = item.item_id.to_lowercase();
            let matches_any = |keywords: &[String]| {
                keywords
                    .iter()
                    .any(|k| display.contains(k.as_str()) || item_id.contains(k.as_str()))
            };

            let vessel_match = matches_any(&vessel_keywords);
            let fragrance_match = matches_any(&fragrance_keywords);
            if !(vessel_match && fragrance_match) {
                continue;
            }

            let text = format!("{} {}", display, item_id);
            for designator in self.table.extract_designators(&text) {
                proven.push(ProvenWick {
                    designator,
                    confidence: calculate_assembly_confidence(
                        vessel_match,
                        fragrance_match,
                        item.oz_fill,
                    ),
                    reasoning: format!(
                        "Proven combination from assembly {} - same vessel and fragrance",
                        item.item_id
                    ),
                });
            }
        }

        proven.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let mut seen = HashSet::new();
        proven.retain(|p| seen.insert(p.designator.clone()));
        proven.truncate(self.max_matches);
        proven
    }

    /// 成品匹配策略
    ///
    /// 容器/蜡/香精名称需全部可解析; 型号优先解析为目录中的烛芯,
    /// 解析不到时使用合成 id。
    pub fn recommend(
        &self,
        store: &dyn AttributeStore,
        catalog: Option<&dyn AssemblyCatalog>,
        vessel_id: &str,
        wax_type_id: &str,
        fragrance_id: &str,
    ) -> RepositoryResult<Vec<WickRecommendation>> {
        let catalog = match catalog {
            Some(c) if c.is_configured() => c,
            _ => {
                debug!("成品匹配: 成品目录不可用, 跳过");
                return Ok(Vec::new());
            }
        };

        let items = catalog.assembly_items()?;
        if items.is_empty() {
            debug!("成品匹配: 成品目录为空");
            return Ok(Vec::new());
        }

        let vessel = store.vessel(vessel_id)?;
        let wax = store.wax_type(wax_type_id)?;
        let fragrance = store.fragrance(fragrance_id)?;
        let (vessel, fragrance) = match (vessel, wax, fragrance) {
            (Some(v), Some(_), Some(f)) => (v, f),
            _ => {
                debug!(vessel_id, wax_type_id, fragrance_id, "成品匹配: 物料名称无法解析");
                return Ok(Vec::new());
            }
        };

        let mut recommendations = Vec::new();
        for proven in self.analyze(&items, &vessel.name, &fragrance.name) {
            let (wick_id, wick_name) = match store.wick_by_name(&proven.designator)? {
                Some(w) => (w.id, w.name),
                None => (synthesized_wick_id(&proven.designator), proven.designator.clone()),
            };
            let rank = recommendations.len() + 1;
            recommendations.push(WickRecommendation::new(
                wick_id,
                wick_name,
                proven.confidence,
                proven.reasoning,
                rank,
            ));
        }

        if recommendations.is_empty() {
            debug!(vessel = %vessel.name, fragrance = %fragrance.name, "成品匹配: 无匹配成品");
        }
        Ok(recommendations)
    }
}

impl Default for AssemblyPatternMatcher {
    fn default() -> Self {
        Self::new(
            SeriesPrefixTable::default(),
            crate::config::engine_config::DEFAULT_MAX_ASSEMBLY_MATCHES,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(item_id: &str, display_name: &str, oz_fill: Option<f64>) -> CatalogAssembly {
        CatalogAssembly {
            item_id: item_id.to_string(),
            display_name: display_name.to_string(),
            oz_fill,
        }
    }

    #[test]
    fn test_extract_keywords_strips_prefixes_and_short_words() {
        assert_eq!(
            extract_keywords("VES-8oz_Tumbler Jar"),
            vec!["8oz".to_string(), "tumbler".to_string(), "jar".to_string()]
        );
        assert_eq!(
            extract_keywords("FO-Vanilla Bean"),
            vec!["vanilla".to_string(), "bean".to_string()]
        );
        assert_eq!(extract_keywords("oil-of"), Vec::<String>::new());
        assert!(extract_keywords("").is_empty());
    }

    #[test]
    fn test_confidence_policy() {
        assert!((calculate_assembly_confidence(true, true, None) - 0.95).abs() < 1e-9);
        assert!((calculate_assembly_confidence(true, false, None) - 0.76).abs() < 1e-9);
        assert!((calculate_assembly_confidence(false, true, None) - 0.76).abs() < 1e-9);
        assert!((calculate_assembly_confidence(false, false, None) - 0.57).abs() < 1e-9);
        assert!((calculate_assembly_confidence(true, true, Some(8.0)) - 0.98).abs() < 1e-9);
        assert!((calculate_assembly_confidence(true, false, Some(8.0)) - 0.81).abs() < 1e-9);
        assert!((calculate_assembly_confidence(true, true, Some(0.0)) - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_series_prefix_table_extracts_all_series() {
        let table = SeriesPrefixTable::default();
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.extract_designators("8oz tumbler vanilla cd-12 eco 4 htp8"),
            vec!["CD-12".to_string(), "ECO-4".to_string(), "HTP-8".to_string()]
        );
        assert!(table.extract_designators("no wick here").is_empty());
    }

    #[test]
    fn test_series_prefix_table_is_data_driven() {
        let table = SeriesPrefixTable::from_rules(&[
            SeriesPrefixRule::new("wood", r"wood[-\s]*(\d+)"),
            SeriesPrefixRule::new("BAD", r"(unclosed"),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.extract_designators("WOOD-3 tin"), vec!["WOOD-3".to_string()]);
    }

    #[test]
    fn test_series_prefix_table_without_usable_rules_uses_defaults() {
        let table = SeriesPrefixTable::from_rules(&[
            SeriesPrefixRule::new("CD", r"cd[("),
            SeriesPrefixRule::new("ECO", r"eco(\d+"),
        ]);
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.extract_designators("8oz Tumbler Vanilla CD-12"),
            vec!["CD-12".to_string()]
        );

        let empty = SeriesPrefixTable::from_rules(&[]);
        assert!(!empty.is_empty());
        assert_eq!(empty.len(), SeriesPrefixTable::default().len());
    }

    #[test]
    fn test_analyze_requires_vessel_and_fragrance_match() {
        let matcher = AssemblyPatternMatcher::default();
        let items = vec![
            item("CDL-TUMBLER-VANILLA-CD12", "Tumbler Vanilla Candle", Some(8.0)),
            item("CDL-TUMBLER-LAVENDER-CD10", "Tumbler Lavender Candle", None),
            item("CDL-TIN-VANILLA-ECO6", "Tin Vanilla Candle", None),
        ];
        let proven = matcher.analyze(&items, "VES-Tumbler", "FO-Vanilla");
        assert_eq!(proven.len(), 1);
        assert_eq!(proven[0].designator, "CD-12");
        assert!((proven[0].confidence - 0.98).abs() < 1e-9);
        assert!(proven[0].reasoning.contains("CDL-TUMBLER-VANILLA-CD12"));
    }

    #[test]
    fn test_analyze_dedups_and_caps() {
        let matcher = AssemblyPatternMatcher::new(SeriesPrefixTable::default(), 6);
        let mut items: Vec<CatalogAssembly> = (1..=9)
            .map(|n| item(&format!("TUMBLER-VANILLA-CD{}", n), "tumbler vanilla", None))
            .collect();
        items.push(item("TUMBLER-VANILLA-CD1-B", "tumbler vanilla", Some(10.0)));

        let proven = matcher.analyze(&items, "Tumbler", "Vanilla");
        assert_eq!(proven.len(), 6);
        // 带灌装量的 CD-1 置信度更高, 去重后保留高置信度那条
        assert_eq!(proven[0].designator, "CD-1");
        assert!((proven[0].confidence - 0.98).abs() < 1e-9);
        let unique: HashSet<_> = proven.iter().map(|p| p.designator.clone()).collect();
        assert_eq!(unique.len(), proven.len());
    }

    #[test]
    fn test_synthesized_wick_id() {
        assert_eq!(synthesized_wick_id("CD-6"), "wick_cd_6");
        assert_eq!(synthesized_wick_id("HTP-10"), "wick_htp_10");
    }
}
