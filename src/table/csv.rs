//! CSV formatting for table export: one header row, one row per result row,
//! comma-separated; a field containing a comma, quote, or newline is
//! double-quoted with internal quotes doubled; rows are joined by `\n`.

fn quote_if_needed(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

fn write_row(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote_if_needed(field));
    }
    out.push('\n');
}

/// Renders a header plus rows into the exact CSV text the Database port's
/// `export_csv_async` streams to disk.
pub fn render(header: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    write_row(&mut out, header);
    for row in rows {
        write_row(&mut out, row);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_are_not_quoted() {
        let csv = render(
            &["a".to_owned(), "b".to_owned()],
            &[vec!["1".to_owned(), "2".to_owned()]],
        );
        assert_eq!(csv, "a,b\n1,2\n");
    }

    #[test]
    fn comma_and_quote_containing_fields_are_escaped() {
        let csv = render(
            &["name".to_owned()],
            &[vec!["say \"hi\", bye".to_owned()]],
        );
        assert_eq!(csv, "name\n\"say \"\"hi\"\", bye\"\n");
    }

    #[test]
    fn newline_in_field_forces_quoting() {
        let csv = render(&["x".to_owned()], &[vec!["a\nb".to_owned()]]);
        assert_eq!(csv, "x\n\"a\nb\"\n");
    }
}
