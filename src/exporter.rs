/* Copyright (C) 2022 Antmicro
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::netlist::{Database, ModuleDump};

pub trait AsBytes {
    fn as_bytes<'s>(&'s self) -> &'s [u8];
}

impl AsBytes for String {
    fn as_bytes<'s>(&'s self) -> &'s [u8] {
        String::as_bytes(self)
    }
}

impl AsBytes for [u8] {
    fn as_bytes<'s>(&'s self) -> &'s [u8] {
        self
    }
}

#[derive(Default)]
struct ExportChecker {
    export: HashSet<String>,
    export_all: bool,
}

impl ExportChecker {
    /* `:all` selects everything */
    fn new(arg_list: &Option<Vec<String>>) -> Self {
        let mut checker = Self::default();
        for arg in arg_list.iter().flatten() {
            if arg == ":all" {
                checker.export_all = true;
            } else {
                checker.export.insert(arg.clone());
            }
        }
        checker
    }

    fn should_export(&self, name: &str) -> bool {
        self.export_all || self.export.contains(name)
    }
}

pub trait Exporter<D> {
    /// Produces and stores `name` if it was selected. `exporter` only runs
    /// for selected names.
    fn ignore_or_export<'s, F>(&'s mut self, name: &str, exporter: F) -> Result<()>
    where
        F: FnOnce() -> Result<D> + 's;

    fn flush(&mut self) -> Result<()>;
}

/// One file per module: `<prefix>/<name><suffix>`.
pub struct MultiFileExporter {
    prefix: String,
    suffix: String,
    checker: ExportChecker,
}

impl MultiFileExporter {
    pub fn new(arg_list: &Option<Vec<String>>, prefix: String, suffix: String) -> Self {
        Self { prefix, suffix, checker: ExportChecker::new(arg_list) }
    }
}

impl<D> Exporter<D> for MultiFileExporter where D: AsBytes {
    fn ignore_or_export<'s, F>(&'s mut self, name: &str, exporter: F) -> Result<()>
    where
        F: FnOnce() -> Result<D> + 's
    {
        if self.checker.should_export(name) {
            let data = exporter()?;
            let path = Path::new(&self.prefix)
                .join(Path::new(&(name.to_string() + &self.suffix)));
            let mut file = File::create(path)?;
            file.write_all(data.as_bytes())?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Everything selected in a single JSON object keyed by name.
pub struct CompoundJsonExporter<D> where D: Serialize {
    filename: PathBuf,
    data: BTreeMap<String, D>,
    checker: ExportChecker,
}

impl<D> CompoundJsonExporter<D> where D: Serialize {
    pub fn new(arg_list: &Option<Vec<String>>, filename: PathBuf) -> Self {
        Self {
            filename,
            data: BTreeMap::new(),
            checker: ExportChecker::new(arg_list),
        }
    }
}

impl<D> Exporter<D> for CompoundJsonExporter<D> where D: Serialize {
    fn ignore_or_export<'s, F>(&'s mut self, name: &str, exporter: F) -> Result<()>
    where
        F: FnOnce() -> Result<D> + 's
    {
        if self.checker.should_export(name) {
            let data = exporter()?;
            self.data.insert(name.into(), data);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.data)?;
        let mut file = File::create(&self.filename)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }
}

/// Module statistics written by the compound summary.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleSummary {
    pub class: String,
    pub width: u32,
    pub height: u32,
    pub ports: usize,
    pub instances: usize,
    pub connections: usize,
}

impl From<&ModuleDump> for ModuleSummary {
    fn from(dump: &ModuleDump) -> Self {
        Self {
            class: dump.class.clone(),
            width: dump.width,
            height: dump.height,
            ports: dump.ports.len(),
            instances: dump.instances.len(),
            connections: dump.connections.iter().map(|c| c.sources.len()).sum(),
        }
    }
}

/// Runs every module of `db` through `exporter`, as JSON netlists.
pub fn export_netlists<E>(db: &Database, exporter: &mut E) -> Result<()> where
    E: Exporter<String>
{
    for (id, module) in db.iter() {
        exporter.ignore_or_export(&module.name, || Ok(serde_json::to_string_pretty(&db.dump(id))?))?;
    }
    exporter.flush()
}

/// Runs every module of `db` through `exporter`, as statistics.
pub fn export_summaries<E>(db: &Database, exporter: &mut E) -> Result<()> where
    E: Exporter<ModuleSummary>
{
    for (id, module) in db.iter() {
        exporter.ignore_or_export(&module.name, || Ok(ModuleSummary::from(&db.dump(id))))?;
    }
    exporter.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::netlist::{Module, ModuleClass};

    fn db() -> Database {
        let mut db = Database::new();
        db.add(Module::new("a".into(), ModuleClass::LogicBlock, 1, 1));
        db.add(Module::new("b".into(), ModuleClass::Array, 2, 3));
        db
    }

    #[test]
    fn test_selection() {
        assert!(ExportChecker::new(&Some(vec![":all".into()])).should_export("x"));
        let checker = ExportChecker::new(&Some(vec!["a".into()]));
        assert!(checker.should_export("a"));
        assert!(!checker.should_export("b"));
        assert!(!ExportChecker::new(&None).should_export("a"));
    }

    #[test]
    fn test_exports() {
        let dir = std::env::temp_dir().join(format!("fabgen-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut files = MultiFileExporter::new(
            &Some(vec!["b".into()]), dir.to_string_lossy().into_owned(), ".json".into()
        );
        export_netlists(&db(), &mut files).unwrap();
        assert!(dir.join("b.json").exists());
        assert!(!dir.join("a.json").exists());

        let summary = dir.join("summary.json");
        let mut compound = CompoundJsonExporter::new(&Some(vec![":all".into()]), summary.clone());
        export_summaries(&db(), &mut compound).unwrap();
        let text = std::fs::read_to_string(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["b"]["height"], 3);
        assert_eq!(value["a"]["class"], "logic_block");

        std::fs::remove_dir_all(dir).unwrap();
    }
}
