//! hstore cells and columns
//!
//! A cell is a string-to-string map; a missing key and a NULL value are the
//! same thing to callers, so assigning `None` removes the key. A column is
//! the sequence of cells aligned with the rows of its record set. Nothing in
//! this module touches the database.

pub mod parser;

use crate::core::errors::{DbError, DbResult};
use serde::Serialize;
use std::collections::BTreeMap;

pub use parser::{parse_hstore, parse_hstore_map, write_hstore};

/// One hstore value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HstoreCell {
    pairs: BTreeMap<String, String>,
}

impl HstoreCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode hstore text; NULL-valued pairs become absent keys
    pub fn parse(text: &str) -> DbResult<Self> {
        Ok(Self {
            pairs: parse_hstore_map(text)?,
        })
    }

    /// hstore text form, keys in sorted order
    pub fn to_text(&self) -> String {
        write_hstore(self.pairs.iter().map(|(k, v)| (k.as_str(), Some(v.as_str()))))
    }

    /// Value under `key`, `None` when absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Set `key` to `value`; `None` removes the key
    pub fn set<K, V>(&mut self, key: K, value: Option<V>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        match value {
            Some(value) => {
                self.pairs.insert(key, value.into());
            }
            None => {
                self.pairs.remove(&key);
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `self || source`: source keys overwrite or add, other keys stay
    pub fn concat(&self, source: &HstoreCell) -> HstoreCell {
        let mut merged = self.clone();
        for (key, value) in &source.pairs {
            merged.pairs.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl<K, V> FromIterator<(K, V)> for HstoreCell
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// How an hstore column is written by an UPDATE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HstoreUpdateMode {
    /// Upsert source keys, keep target keys the source does not mention
    #[default]
    Concat,
    /// Overwrite the target cell with the source cell
    Replace,
}

impl HstoreUpdateMode {
    pub fn from_concat_flag(concat: bool) -> Self {
        if concat {
            HstoreUpdateMode::Concat
        } else {
            HstoreUpdateMode::Replace
        }
    }

    /// The cell the target ends up with after the update
    pub fn apply(&self, target: &HstoreCell, source: &HstoreCell) -> HstoreCell {
        match self {
            HstoreUpdateMode::Concat => target.concat(source),
            HstoreUpdateMode::Replace => source.clone(),
        }
    }
}

/// hstore cells aligned with the rows of a record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HstoreColumn {
    name: String,
    cells: Vec<HstoreCell>,
}

impl HstoreColumn {
    pub fn new(name: impl Into<String>, cells: Vec<HstoreCell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// Decode text values of a result column; SQL NULL becomes an empty cell
    pub fn decode(name: impl Into<String>, values: &[Option<&str>]) -> DbResult<Self> {
        let name = name.into();
        let cells = values
            .iter()
            .enumerate()
            .map(|(row, value)| match value {
                Some(text) => HstoreCell::parse(text).map_err(|e| e.at_cell(&name, row)),
                None => Ok(HstoreCell::new()),
            })
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self { name, cells })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[HstoreCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, row: usize) -> Option<&HstoreCell> {
        self.cells.get(row)
    }

    pub fn cell_mut(&mut self, row: usize) -> Option<&mut HstoreCell> {
        self.cells.get_mut(row)
    }

    /// Value under `key` for every row
    pub fn get(&self, key: &str) -> Vec<Option<&str>> {
        self.cells.iter().map(|cell| cell.get(key)).collect()
    }

    /// Value under `key` for the rows at `rows`, aligned with `rows`
    pub fn get_rows(&self, rows: &[usize], key: &str) -> DbResult<Vec<Option<&str>>> {
        rows.iter()
            .map(|&row| self.checked_cell(row).map(|cell| cell.get(key)))
            .collect()
    }

    /// Set `key` on every cell; `None` removes it
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        for cell in &mut self.cells {
            cell.set(key, value);
        }
    }

    /// Set `key` on the cells at `rows`
    ///
    /// A single value is applied to every selected cell; otherwise there must
    /// be one value per position. `None` removes the key.
    pub fn set_rows(&mut self, rows: &[usize], key: &str, values: &[Option<&str>]) -> DbResult<()> {
        if values.len() != 1 && values.len() != rows.len() {
            return Err(DbError::LengthMismatch {
                expected: rows.len(),
                actual: values.len(),
            });
        }
        if let Some(&row) = rows.iter().find(|&&row| row >= self.cells.len()) {
            return Err(DbError::IndexOutOfBounds {
                index: row,
                len: self.cells.len(),
            });
        }

        for (i, &row) in rows.iter().enumerate() {
            let value = if values.len() == 1 { values[0] } else { values[i] };
            self.cells[row].set(key, value);
        }
        Ok(())
    }

    /// Cells at the given positions, in the given order
    pub fn subset(&self, rows: &[usize]) -> DbResult<Self> {
        let cells = rows
            .iter()
            .map(|&row| self.checked_cell(row).cloned())
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self {
            name: self.name.clone(),
            cells,
        })
    }

    /// Same cells under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: self.cells.clone(),
        }
    }

    fn checked_cell(&self, row: usize) -> DbResult<&HstoreCell> {
        self.cells.get(row).ok_or(DbError::IndexOutOfBounds {
            index: row,
            len: self.cells.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translations() -> HstoreColumn {
        HstoreColumn::new(
            "translations",
            vec![
                HstoreCell::from_iter([("en", "hello"), ("es", "hola")]),
                HstoreCell::from_iter([("en", "yes")]),
                HstoreCell::new(),
            ],
        )
    }

    #[test]
    fn test_round_trip_including_empty_cell() {
        let cells = vec![
            HstoreCell::new(),
            HstoreCell::from_iter([("a", "1")]),
            HstoreCell::from_iter([("quote\"d", "back\\slash"), ("comma,", "=> arrow"), ("", "")]),
            HstoreCell::from_iter([("NULL", "NULL"), ("spaces ", " padded ")]),
        ];
        for cell in cells {
            let text = cell.to_text();
            assert_eq!(HstoreCell::parse(&text).unwrap(), cell, "text: {}", text);
        }
    }

    #[test]
    fn test_absent_key_is_none() {
        let column = translations();
        assert_eq!(column.get("fr"), vec![None, None, None]);
        assert_eq!(column.cell(2).unwrap().get("en"), None);
    }

    #[test]
    fn test_get_over_column_and_subset() {
        let column = translations();
        assert_eq!(column.get("en"), vec![Some("hello"), Some("yes"), None]);
        assert_eq!(
            column.get_rows(&[2, 0], "en").unwrap(),
            vec![None, Some("hello")]
        );
        assert!(matches!(
            column.get_rows(&[5], "en"),
            Err(DbError::IndexOutOfBounds { index: 5, len: 3 })
        ));
    }

    #[test]
    fn test_null_assignment_removes_key() {
        let mut column = translations();
        column.set("es", None);

        assert_eq!(column.get("es"), vec![None, None, None]);
        let text = column.cell(0).unwrap().to_text();
        assert!(!text.contains("es"));
        assert_eq!(text, r#""en"=>"hello""#);
    }

    #[test]
    fn test_set_rows_broadcast_and_aligned() {
        let mut column = translations();
        column.set_rows(&[1, 2], "fr", &[Some("oui")]).unwrap();
        assert_eq!(column.get("fr"), vec![None, Some("oui"), Some("oui")]);

        column
            .set_rows(&[2, 0], "de", &[Some("ja"), Some("hallo")])
            .unwrap();
        assert_eq!(column.get("de"), vec![Some("hallo"), None, Some("ja")]);

        column.set_rows(&[0], "en", &[None]).unwrap();
        assert!(!column.cell(0).unwrap().contains_key("en"));

        assert!(matches!(
            column.set_rows(&[0, 1, 2], "x", &[Some("1"), Some("2")]),
            Err(DbError::LengthMismatch { expected: 3, actual: 2 })
        ));
        assert!(column.set_rows(&[9], "x", &[Some("1")]).is_err());
        // failed calls leave cells untouched
        assert_eq!(column.get("x"), vec![None, None, None]);
    }

    #[test]
    fn test_subset_preserves_alignment() {
        let column = translations();
        let subset = column.subset(&[1, 0]).unwrap();
        assert_eq!(subset.get("en"), vec![Some("yes"), Some("hello")]);
        assert_eq!(subset.name(), "translations");
    }

    #[test]
    fn test_concat_and_replace_modes() {
        let target = HstoreCell::from_iter([("es", "hola")]);
        let source = HstoreCell::from_iter([("es", "bonjour"), ("fr", "oui")]);
        let expected = HstoreCell::from_iter([("es", "bonjour"), ("fr", "oui")]);

        assert_eq!(HstoreUpdateMode::Concat.apply(&target, &source), expected);
        assert_eq!(HstoreUpdateMode::Replace.apply(&target, &source), expected);

        // Keys only the target has survive concat but not replace
        let target = HstoreCell::from_iter([("es", "hola"), ("de", "hallo")]);
        let merged = HstoreUpdateMode::Concat.apply(&target, &source);
        assert_eq!(merged.get("de"), Some("hallo"));
        assert_eq!(merged.get("es"), Some("bonjour"));
        let replaced = HstoreUpdateMode::Replace.apply(&target, &source);
        assert_eq!(replaced.get("de"), None);
        assert_eq!(replaced, source);
    }

    #[test]
    fn test_deleted_source_key_invisible_in_concat() {
        let target = HstoreCell::from_iter([("es", "hola"), ("fr", "oui")]);
        let mut source = target.clone();
        source.set::<_, String>("fr", None);

        let merged = HstoreUpdateMode::from_concat_flag(true).apply(&target, &source);
        assert_eq!(merged.get("fr"), Some("oui"));

        let replaced = HstoreUpdateMode::from_concat_flag(false).apply(&target, &source);
        assert_eq!(replaced.get("fr"), None);
    }

    #[test]
    fn test_decode_column() {
        let column = HstoreColumn::decode(
            "tags",
            &[Some(r#""a"=>"1""#), None, Some("")],
        )
        .unwrap();
        assert_eq!(column.get("a"), vec![Some("1"), None, None]);
        assert!(column.cell(1).unwrap().is_empty());

        let err = HstoreColumn::decode("tags", &[Some("ok=>1"), Some("broken=>")]).unwrap_err();
        assert!(matches!(err, DbError::Decode { row: Some(1), .. }));
    }
}
