//! A small builder for dynamic `WHERE` clauses.
//!
//! Every bound value is text (UUIDs, dates, timestamps and enum names are
//! all stored as text), so parameters are collected as `String`s and bound
//! positionally with `?`.

use rusqlite::{Statement, params_from_iter};

#[derive(Debug, Default)]
pub struct Filter {
  conds:  Vec<String>,
  params: Vec<String>,
}

impl Filter {
  pub fn new() -> Self { Self::default() }

  /// A condition with no parameters.
  pub fn raw(&mut self, cond: &str) -> &mut Self {
    self.conds.push(cond.to_owned());
    self
  }

  /// `column = ?`.
  pub fn eq(&mut self, column: &str, value: impl Into<String>) -> &mut Self {
    self.conds.push(format!("{column} = ?"));
    self.params.push(value.into());
    self
  }

  /// `column = ?` when `value` is present.
  pub fn eq_opt(&mut self, column: &str, value: Option<impl Into<String>>) -> &mut Self {
    if let Some(v) = value {
      self.eq(column, v);
    }
    self
  }

  /// `column <op> ?` for range bounds (`>=`, `<`, …).
  pub fn cmp(&mut self, column: &str, op: &str, value: impl Into<String>) -> &mut Self {
    self.conds.push(format!("{column} {op} ?"));
    self.params.push(value.into());
    self
  }

  /// `column IN (?, …)`. An empty list adds nothing.
  pub fn any_of<I, V>(&mut self, column: &str, values: I) -> &mut Self
  where
    I: IntoIterator<Item = V>,
    V: Into<String>,
  {
    let before = self.params.len();
    self.params.extend(values.into_iter().map(Into::into));
    let n = self.params.len() - before;
    if n > 0 {
      let marks = vec!["?"; n].join(", ");
      self.conds.push(format!("{column} IN ({marks})"));
    }
    self
  }

  /// Case-insensitive substring match on any of `columns`. `%`, `_` and `\`
  /// in `text` match literally.
  pub fn contains(&mut self, columns: &[&str], text: &str) -> &mut Self {
    if columns.is_empty() {
      return self;
    }
    let pattern = format!("%{}%", escape_like(&text.to_lowercase()));
    let conds: Vec<String> = columns
      .iter()
      .map(|c| format!("LOWER({c}) LIKE ? ESCAPE '\\'"))
      .collect();
    self.conds.push(format!("({})", conds.join(" OR ")));
    self.params.extend(std::iter::repeat_n(pattern, columns.len()));
    self
  }

  /// `WHERE a AND b …`, or the empty string.
  pub fn clause(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }

  /// Run `stmt` with the collected parameters, mapping each row with `f`.
  pub fn query<T>(
    &self,
    stmt: &mut Statement<'_>,
    f: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
  ) -> rusqlite::Result<Vec<T>> {
    stmt
      .query_map(params_from_iter(self.params.iter()), f)?
      .collect()
  }

  #[cfg(test)]
  pub fn params(&self) -> impl Iterator<Item = &String> { self.params.iter() }
}

fn escape_like(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    if matches!(c, '\\' | '%' | '_') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_lists_add_no_condition() {
    let mut f = Filter::new();
    f.eq("org", "o1").any_of("id", Vec::<String>::new()).any_of("kind", ["a", "b"]);
    assert_eq!(f.clause(), "WHERE org = ? AND kind IN (?, ?)");
    assert_eq!(f.params().count(), 3);
  }

  #[test]
  fn contains_escapes_wildcards() {
    let mut f = Filter::new();
    f.contains(&["title", "email"], "50%_OFF\\");
    assert_eq!(f.clause(), "WHERE (LOWER(title) LIKE ? ESCAPE '\\' OR LOWER(email) LIKE ? ESCAPE '\\')");
    let params: Vec<&String> = f.params().collect();
    assert_eq!(params, ["%50\\%\\_off\\\\%", "%50\\%\\_off\\\\%"]);
  }

  #[test]
  fn no_conditions_no_where() {
    assert_eq!(Filter::new().clause(), "");
  }
}
