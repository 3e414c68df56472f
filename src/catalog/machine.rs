//! `JOE_MACHINES.TXT` loader: a `;`-delimited catalog of known machine
//! models with a header row, read through the `csv` crate with
//! `has_headers` doing the skip.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::error::Error;

/// A single row of the machine catalog: article number, model name, the
/// file stem used to locate `<stem>.xml`, and a version byte.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Machine {
    pub article_number: u64,
    pub name: String,
    pub file_stem: String,
    pub version: u8,
}

/// The full, immutable machine catalog, keyed by article number.
#[derive(Clone, Debug, Default)]
pub struct MachineCatalog {
    by_article: HashMap<u64, Machine>,
}

impl MachineCatalog {
    /// Loads `JOE_MACHINES.TXT` from `path`. A missing or corrupt catalog is
    /// treated as fatal at process start — callers should not attempt to
    /// construct a session without one.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| Error::Catalog(format!("opening {}: {e}", path.display())))?;

        let mut by_article = HashMap::new();
        for record in rdr.records() {
            let record =
                record.map_err(|e| Error::Catalog(format!("reading {}: {e}", path.display())))?;
            let machine = parse_row(&record)
                .map_err(|e| Error::Catalog(format!("parsing row in {}: {e}", path.display())))?;
            by_article.insert(machine.article_number, machine);
        }
        info!(count = by_article.len(), path = %path.display(), "loaded machine catalog");
        Ok(Self { by_article })
    }

    /// Looks up the catalog entry for an article number decoded from the
    /// manufacturer advertisement.
    #[must_use]
    pub fn lookup(&self, article_number: u64) -> Option<&Machine> {
        self.by_article.get(&article_number)
    }

    /// Number of machines in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_article.len()
    }

    /// Whether the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_article.is_empty()
    }

    /// Builds a catalog directly from rows, bypassing file loading.
    #[cfg(any(test, feature = "testing"))]
    #[must_use]
    pub fn from_entries_for_test(entries: Vec<Machine>) -> Self {
        Self {
            by_article: entries.into_iter().map(|m| (m.article_number, m)).collect(),
        }
    }
}

fn parse_row(record: &csv::StringRecord) -> Result<Machine, String> {
    let get = |i: usize| record.get(i).ok_or_else(|| format!("missing field {i}"));
    let article_number: u64 = get(0)?
        .parse()
        .map_err(|e| format!("bad article number: {e}"))?;
    let name = get(1)?.to_owned();
    let file_stem = get(2)?.to_owned();
    let version: u8 = get(3)?.parse().map_err(|e| format!("bad version: {e}"))?;
    Ok(Machine {
        article_number,
        name,
        file_stem,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_looks_up_rows() {
        let mut f = tempfile_with(
            "ArticleNumber;Name;FileStem;Version\n1000;Impressa X9;impressa_x9;3\n2000;S8;s8;1\n",
        );
        let catalog = MachineCatalog::load(f.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        let m = catalog.lookup(1000).unwrap();
        assert_eq!(m.name, "Impressa X9");
        assert_eq!(m.file_stem, "impressa_x9");
        assert_eq!(m.version, 3);
        assert!(catalog.lookup(9999).is_none());
        f.close().unwrap();
    }

    #[test]
    fn missing_file_is_catalog_error() {
        assert!(matches!(
            MachineCatalog::load("/nonexistent/JOE_MACHINES.TXT"),
            Err(Error::Catalog(_))
        ));
    }

    fn tempfile_with(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }
}
