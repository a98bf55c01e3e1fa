//! Contract Tests for the Device Catalog

#[path = "../test_utils/mod.rs"]
mod test_utils;

use fleetshell::catalog::{CsvTableSource, DeviceCatalog, MergePolicy, Table};
use fleetshell::config::ColumnConfig;
use test_utils::{catalog_from_csv, LOGIN_HEADER};

#[test]
fn test_devices_in_first_appearance_order() {
    let catalog = catalog_from_csv(&format!(
        "{LOGIN_HEADER}\n\
         B,10.0.0.2,u,p,x,\n\
         A,10.0.0.1,u,p,y,\n\
         B,10.0.0.2,u,p,z,\n"
    ));
    let names: Vec<&str> = catalog.device_names().collect();
    assert_eq!(names, vec!["B", "A"]);
    assert_eq!(catalog.device_count(), 2);
    assert!(!catalog.is_empty());
}

#[test]
fn test_command_column_offset() {
    let with_login = catalog_from_csv(&format!("{LOGIN_HEADER}\nSW1,10.0.0.1,u,p,a,b\n"));
    assert!(with_login.executable_columns_present());
    assert_eq!(with_login.command_column_offset(), 4);
    assert_eq!(with_login.command_headers(), vec!["命令1", "命令2"]);

    let without_login = catalog_from_csv("设备名称,命令1,命令2\nSW1,a,b\n");
    assert!(!without_login.executable_columns_present());
    assert_eq!(without_login.command_column_offset(), 1);
    assert_eq!(
        without_login.missing_login_columns(),
        &["address", "username", "password"]
    );
}

#[test]
fn test_row_fragments_preserve_order() {
    let catalog = catalog_from_csv(
        "device name,c1,c2\n\
         SW1,a1,a2\n\
         SW2,b1,b2\n\
         SW1,c1,c2\n",
    );
    let fragments = catalog.fragments("SW1").unwrap();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].commands, vec!["a1", "a2"]);
    assert_eq!(fragments[1].commands, vec!["c1", "c2"]);
    assert_eq!(fragments[1].row_number, 3);
    assert!(fragments[0].credentials.is_none());
}

#[test]
fn test_merge_collapses_rows() {
    let catalog = catalog_from_csv(&format!(
        "{LOGIN_HEADER}\n\
         SW1,10.0.0.1,u,p,show version,\n\
         SW1,10.0.0.1,u,p,show clock,show vlan\n"
    ));
    let record = catalog.merge("SW1", MergePolicy::AllRows).unwrap();
    assert_eq!(record.name, "SW1");
    assert!(record.is_executable());
    let sendable: Vec<&str> = record.sendable_commands().collect();
    assert_eq!(sendable, vec!["show version", "show clock", "show vlan"]);

    assert!(catalog.merge("SW9", MergePolicy::AllRows).is_none());
}

#[test]
fn test_custom_column_aliases() {
    let table = Table::from_rows(&["Hostname", "Mgmt IP", "User", "Pass", "cmd"], &[&[
        "R1", "192.0.2.1", "ops", "secret", "show ip route",
    ]]);
    let columns = ColumnConfig {
        device_name: vec!["hostname".to_string()],
        address: vec!["mgmt ip".to_string()],
        username: vec!["user".to_string()],
        password: vec!["pass".to_string()],
    };
    let catalog = DeviceCatalog::from_table(&table, &columns).unwrap();
    assert!(catalog.executable_columns_present());
    assert_eq!(catalog.device_names().collect::<Vec<_>>(), vec!["R1"]);
}

#[test]
fn test_header_only_table_is_empty() {
    let table = CsvTableSource::parse("device name,c1\n".as_bytes(), b',').unwrap();
    let catalog = DeviceCatalog::from_table(&table, &ColumnConfig::default()).unwrap();
    assert!(catalog.is_empty());
}
