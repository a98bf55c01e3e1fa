//! Device Catalog
//!
//! Turns a table into an ordered mapping of device name to row fragments.
//!
//! The device name column is required. The address, username and
//! password columns are structural only when all three are present; in
//! that case the catalog is *executable*. Every other column is a command
//! column, read in column order.
//!
//! Rows sharing a device name stay separate fragments until a device is
//! collapsed with [`DeviceCatalog::merge`].

pub mod source;

pub use source::{table_source_for, CsvTableSource, Table, TableSource, XlsxTableSource};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::ColumnConfig;
use crate::error::{Error, Result};
use crate::models::{Credentials, DeviceRecord, RowFragment};

/// How several rows of one device become a single execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Concatenate every row's commands in row order and execute once
    #[default]
    AllRows,
    /// Use only the last row of the device (commands and login details)
    LastRow,
}

/// Column positions of the login fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginColumns {
    pub address: usize,
    pub username: usize,
    pub password: usize,
}

/// Which columns are structural and which carry commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Device name column
    pub name: usize,
    /// Login columns, only when all three are present
    pub login: Option<LoginColumns>,
    /// Command columns in column order
    pub commands: Vec<usize>,
    /// Login fields whose column is absent
    pub missing_login: Vec<String>,
}

impl ColumnLayout {
    /// Resolve the layout of `table` against the configured header aliases
    pub fn resolve(table: &Table, columns: &ColumnConfig) -> Result<Self> {
        let name = table
            .column_index(&columns.device_name)
            .ok_or_else(|| Error::MissingColumn {
                column: first_alias(&columns.device_name),
            })?;

        let address = table.column_index(&columns.address);
        let username = table.column_index(&columns.username);
        let password = table.column_index(&columns.password);

        let mut missing_login = Vec::new();
        for (index, aliases) in [
            (address, &columns.address),
            (username, &columns.username),
            (password, &columns.password),
        ] {
            if index.is_none() {
                missing_login.push(first_alias(aliases));
            }
        }

        let login = match (address, username, password) {
            (Some(address), Some(username), Some(password)) => Some(LoginColumns {
                address,
                username,
                password,
            }),
            _ => None,
        };

        let structural = |index: usize| {
            index == name
                || login
                    .map(|l| index == l.address || index == l.username || index == l.password)
                    .unwrap_or(false)
        };
        let commands = (0..table.headers().len())
            .filter(|index| !structural(*index))
            .collect();

        Ok(Self {
            name,
            login,
            commands,
            missing_login,
        })
    }

    /// Number of structural columns (name, plus login columns when complete)
    pub fn structural_count(&self) -> usize {
        if self.login.is_some() {
            4
        } else {
            1
        }
    }
}

fn first_alias(aliases: &[String]) -> String {
    aliases
        .iter()
        .find(|a| !a.trim().is_empty())
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    fragments: Vec<RowFragment>,
}

/// Devices of a table in order of first appearance, each with its row fragments
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    headers: Vec<String>,
    layout: ColumnLayout,
    entries: Vec<CatalogEntry>,
}

impl DeviceCatalog {
    /// Read a source and build the catalog
    pub fn load(source: &dyn TableSource, columns: &ColumnConfig) -> Result<Self> {
        let table = source.read_table()?;
        Self::from_table(&table, columns)
    }

    /// Build the catalog from an already-read table
    pub fn from_table(table: &Table, columns: &ColumnConfig) -> Result<Self> {
        let layout = ColumnLayout::resolve(table, columns)?;

        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (row_idx, row) in table.rows().iter().enumerate() {
            let row_number = row_idx + 1;
            let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

            let name = cell(layout.name).trim();
            if name.is_empty() {
                warn!("Skipping row {}: device name is blank", row_number);
                continue;
            }

            let commands = layout
                .commands
                .iter()
                .map(|&i| cell(i).to_string())
                .collect();
            let mut fragment = RowFragment::new(row_number, commands);
            if let Some(login) = layout.login {
                fragment = fragment.with_credentials(Credentials::new(
                    cell(login.address).trim(),
                    cell(login.username).trim(),
                    cell(login.password),
                ));
            }

            match index.get(name) {
                Some(&slot) => entries[slot].fragments.push(fragment),
                None => {
                    index.insert(name.to_string(), entries.len());
                    entries.push(CatalogEntry {
                        name: name.to_string(),
                        fragments: vec![fragment],
                    });
                }
            }
        }

        debug!(
            "Catalog built: {} devices from {} rows, executable={}",
            entries.len(),
            table.rows().len(),
            layout.login.is_some()
        );

        Ok(Self {
            headers: table.headers().to_vec(),
            layout,
            entries,
        })
    }

    /// True when address, username and password columns all exist
    pub fn executable_columns_present(&self) -> bool {
        self.layout.login.is_some()
    }

    /// Names of the login columns the table lacks
    pub fn missing_login_columns(&self) -> &[String] {
        &self.layout.missing_login
    }

    /// Number of structural columns preceding the commands in the reference layout
    pub fn command_column_offset(&self) -> usize {
        self.layout.structural_count()
    }

    /// Resolved column layout
    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Headers of the command columns, in column order
    pub fn command_headers(&self) -> Vec<&str> {
        self.layout
            .commands
            .iter()
            .filter_map(|&i| self.headers.get(i).map(String::as_str))
            .collect()
    }

    /// Number of distinct devices
    pub fn device_count(&self) -> usize {
        self.entries.len()
    }

    /// True when the table produced no devices
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Device names in order of first appearance
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Devices with their row fragments, in order of first appearance
    pub fn devices(&self) -> impl Iterator<Item = (&str, &[RowFragment])> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.fragments.as_slice()))
    }

    /// Row fragments of one device
    pub fn fragments(&self, name: &str) -> Option<&[RowFragment]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.fragments.as_slice())
    }

    /// Collapse a device's fragments into one record
    pub fn merge(&self, name: &str, policy: MergePolicy) -> Option<DeviceRecord> {
        let fragments = self.fragments(name)?;
        Some(merge_fragments(name, fragments, policy))
    }
}

/// Collapse row fragments into a single device record
pub fn merge_fragments(name: &str, fragments: &[RowFragment], policy: MergePolicy) -> DeviceRecord {
    match policy {
        MergePolicy::LastRow => {
            let last = fragments.last();
            DeviceRecord {
                name: name.to_string(),
                credentials: last.and_then(|f| f.credentials.clone()),
                commands: last.map(|f| f.commands.clone()).unwrap_or_default(),
            }
        }
        MergePolicy::AllRows => {
            let credentials = fragments
                .iter()
                .filter_map(|f| f.credentials.as_ref())
                .find(|c| c.is_complete())
                .or_else(|| fragments.iter().find_map(|f| f.credentials.as_ref()))
                .cloned();

            if let Some(chosen) = &credentials {
                let conflicting = fragments
                    .iter()
                    .filter_map(|f| f.credentials.as_ref())
                    .filter(|c| c.is_complete())
                    .any(|c| c.address != chosen.address || c.username != chosen.username);
                if conflicting {
                    warn!(
                        "Device {} has rows with differing login details, using row values of the first complete row",
                        name
                    );
                }
            }

            DeviceRecord {
                name: name.to_string(),
                credentials,
                commands: fragments
                    .iter()
                    .flat_map(|f| f.commands.iter().cloned())
                    .collect(),
            }
        }
    }
}
