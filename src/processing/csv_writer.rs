use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// How the values of a column are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnFormat {
    Integer,
    Scientific,
}

/// A named column of a CSV table.
#[derive(Clone, Debug)]
pub struct Column<'a> {
    pub header: &'a str,
    pub format: ColumnFormat,
    pub values: &'a [f64],
}

impl<'a> Column<'a> {
    pub fn integer(header: &'a str, values: &'a [f64]) -> Self {
        Self {
            header,
            format: ColumnFormat::Integer,
            values,
        }
    }

    pub fn scientific(header: &'a str, values: &'a [f64]) -> Self {
        Self {
            header,
            format: ColumnFormat::Scientific,
            values,
        }
    }

    fn cell(&self, row: usize) -> String {
        match (self.values.get(row), self.format) {
            (None, _) => String::new(),
            (Some(v), ColumnFormat::Integer) => format!("{}", v.round() as i64),
            (Some(v), ColumnFormat::Scientific) => format!("{:.15e}", v),
        }
    }
}

/// Write columns to a CSV file with one header line. Shorter columns leave
/// their trailing cells empty.
pub fn write_csv<P: AsRef<Path>>(path: P, columns: &[Column<'_>]) -> io::Result<()> {
    if columns.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "a CSV table needs at least one column",
        ));
    }

    let mut file = BufWriter::new(File::create(path)?);
    let headers: Vec<&str> = columns.iter().map(|c| c.header).collect();
    writeln!(file, "{}", headers.join(","))?;

    let n_rows = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
    for i in 0..n_rows {
        let row: Vec<String> = columns.iter().map(|c| c.cell(i)).collect();
        writeln!(file, "{}", row.join(","))?;
    }
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_write_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let steps = [0.0, 1.0, 2.0];
        let values = [1.0, 0.5];

        write_csv(
            &path,
            &[Column::integer("step", &steps), Column::scientific("u", &values)],
        )
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "step,u");
        assert_eq!(lines[1], "0,1.000000000000000e0");
        assert_eq!(lines[3], "2,");
    }

    #[test]
    fn empty_table_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(write_csv(dir.path().join("t.csv"), &[]).is_err());
    }
}
