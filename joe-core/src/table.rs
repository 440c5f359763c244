//! Minimal fixed-width table rendering, for psql meta-command and hypopg
//! list output rendered into chat as a fenced code block.

/// Render `rows` (first row is the header) as a simple left-aligned table.
pub fn render_table(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let cols = rows[0].len();
    let mut widths = vec![0usize; cols];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for (r, row) in rows.iter().enumerate() {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths[i]))
            .collect();
        out.push_str(line.join(" | ").trim_end());
        out.push('\n');

        if r == 0 {
            let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            out.push_str(&sep.join("-+-"));
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_header_and_rows() {
        let rows = vec![
            vec!["name".into(), "age".into()],
            vec!["ann".into(), "30".into()],
        ];
        let table = render_table(&rows);
        assert!(table.contains("name"));
        assert!(table.contains("---"));
        assert!(table.contains("ann"));
    }

    #[test]
    fn empty_rows_render_empty_string() {
        assert_eq!(render_table(&[]), "");
    }
}
