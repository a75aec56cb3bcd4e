// ==========================================
// 参考数据导入集成测试
// ==========================================
// 测试目标: CSV 文件 → 解析 → 行映射/校验 → 仓储落库
// ==========================================

mod test_helpers;

use std::io::Write;

use tempfile::{Builder, NamedTempFile};
use test_helpers::*;
use wick_advisor::importer::{ImportError, ReferenceImporter, ReferenceKind};
use wick_advisor::logging;
use wick_advisor::repository::{AssemblyRepository, ComponentRepository};

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_import_vessels_with_row_errors() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path).unwrap();
    let importer = ReferenceImporter::from_connection(conn.clone());

    let file = csv_file(
        "ID,Name,Volume_ml,Diameter_mm,Height_mm,Shape,Material,Double_Wick\n\
         v_jar,16oz Jar,473,85,110,jar,glass,yes\n\
         v_bad,Broken,abc,85,110,jar,glass,no\n\
         ,No Id,200,70,80,tin,metal,\n\
         ,,,,,,,\n\
         v_tin,4oz Tin,118,65,55,tin,metal,0\n",
    );

    let report = importer.import_file(ReferenceKind::Vessels, file.path()).unwrap();

    // 空行在解析阶段跳过
    assert_eq!(report.total_rows, 4);
    assert_eq!(report.imported, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors[0].row, 3);
    assert!(report.errors[0].message.contains("volume_ml"));
    assert_eq!(report.errors[1].row, 4);

    let repo = ComponentRepository::from_connection(conn);
    let jar = repo.find_vessel_by_id("v_jar").unwrap().unwrap();
    assert_eq!(jar.name, "16oz Jar");
    assert!(jar.double_wick);
    assert_eq!(jar.heat_dissipation_factor, 1.0);
    assert!(!repo.find_vessel_by_id("v_tin").unwrap().unwrap().double_wick);
    assert!(repo.find_vessel_by_id("v_bad").unwrap().is_none());
}

#[test]
fn test_import_wicks_then_lookup_by_name() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path).unwrap();
    let importer = ReferenceImporter::from_connection(conn.clone());

    let file = csv_file(
        "id,name,series,size,size_index\n\
         eco_8,ECO-8,ECO,8,8\n\
         eco_10,ECO-10,ECO,10,10\n\
         lx_20,LX-20,LX,,20\n",
    );
    let report = importer.import_file(ReferenceKind::Wicks, file.path()).unwrap();
    assert_eq!(report.imported, 3);
    assert_eq!(report.failed, 0);

    let repo = ComponentRepository::from_connection(conn);
    let lx = repo.find_wick_by_name("LX-20").unwrap().unwrap();
    assert_eq!(lx.id, "lx_20");
    assert_eq!(lx.size, None);
    assert_eq!(repo.list_wicks_by_series("ECO").unwrap().len(), 2);
}

#[test]
fn test_import_assemblies_reports_unknown_references() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    let importer = ReferenceImporter::from_connection(conn.clone());

    let file = csv_file(&format!(
        "id,name,vessel_id,wax_type_id,fragrance_id,fragrance_load_percentage,wick_id_1,approved_date\n\
         a_ok,Vanilla Tumbler,{v},{w},{f},8.5,cd_8,2024-03-01\n\
         a_ghost,Ghost,{v},{w},{f},8.5,zz_99,\n\
         a_heavy,Overload,{v},{w},{f},150,cd_8,\n",
        v = VESSEL_TUMBLER,
        w = WAX_SOY,
        f = FRAG_VANILLA
    ));
    let report = importer.import_file(ReferenceKind::Assemblies, file.path()).unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(
        report.errors.iter().map(|e| e.row).collect::<Vec<_>>(),
        vec![3, 4]
    );

    let assembly = AssemblyRepository::from_connection(conn)
        .find_assembly_by_id("a_ok")
        .unwrap()
        .unwrap();
    assert_eq!(assembly.wick_id.as_deref(), Some("cd_8"));
    assert_eq!(
        assembly.approved_date.map(|d| d.format("%Y-%m-%d").to_string()),
        Some("2024-03-01".to_string())
    );
}

#[test]
fn test_import_catalog_and_conversions() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    let importer = ReferenceImporter::from_connection(conn.clone());

    let catalog = csv_file(
        "ItemID,DisplayName,Oz_Fill\n\
         CDL-8OZ-VANILLA-CD12,8oz Vanilla Tumbler CD-12,8\n\
         CDL-4OZ-CITRUS-ECO8,4oz Citrus Tin ECO-8,\n",
    );
    let report = importer
        .import_file(ReferenceKind::CatalogAssemblies, catalog.path())
        .unwrap();
    assert_eq!(report.imported, 2);

    let conversions = csv_file(&format!(
        "vessel_id,old_wax_type_id,new_wax_type_id,wick_size_delta,confidence_score,sample_count\n\
         {v},{old},{new},2,0.8,5\n\
         {v},{new},{old},-2,1.5,5\n",
        v = VESSEL_TUMBLER,
        old = WAX_COCO,
        new = WAX_SOY
    ));
    let report = importer
        .import_file(ReferenceKind::WaxConversions, conversions.path())
        .unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.failed, 1);

    let repo = AssemblyRepository::from_connection(conn);
    assert_eq!(repo.count_catalog_assemblies().unwrap(), 2);
    let delta = repo
        .find_wax_conversion_delta(VESSEL_TUMBLER, WAX_COCO, WAX_SOY)
        .unwrap()
        .unwrap();
    assert_eq!(delta.wick_size_delta, 2);
    assert_eq!(delta.sample_count, 5);
}

#[test]
fn test_import_file_level_errors() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    let importer = ReferenceImporter::from_connection(conn);

    assert!(matches!(
        importer.import_file(ReferenceKind::Wicks, "/nonexistent/wicks.csv"),
        Err(ImportError::FileNotFound(_))
    ));

    let txt = Builder::new().suffix(".txt").tempfile().unwrap();
    assert!(matches!(
        importer.import_file(ReferenceKind::Wicks, txt.path()),
        Err(ImportError::UnsupportedFormat(_))
    ));
}
