use std::fs;
use std::io::{self, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Strip bracketed annotations from Newick strings.
///
/// Tree files exported by inference tools often carry [&...] annotations
/// next to branch lengths; they contribute nothing to the topology and
/// confuse the parser, so they are removed up front.
fn strip_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut chars = newick.chars().peekable();
    let mut in_annotation = false;

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// Read named Newick trees from a file.
///
/// One `;`-terminated tree per line. Lines of the form `name = newick`
/// keep their explicit name; everything else is named by position
/// (`tree_0`, `tree_1`, ...). Blank lines and `#` comments are skipped.
pub fn read_newick_trees<P: AsRef<Path>>(path: P) -> io::Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_newick_list(&content))
}

/// The parsing half of [`read_newick_trees`], separated for testing.
pub fn parse_newick_list(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(idx, line)| {
            let (name, body) = match line.split_once(" = ") {
                Some((name, body)) => (name.trim().to_string(), body.trim()),
                None => (format!("tree_{idx}"), line),
            };
            (name, strip_annotations(body))
        })
        .collect()
}

/// Write a labeled square matrix as TSV to a file.
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_matrix_tsv<P: AsRef<Path>, T: std::fmt::Display>(
    path: P,
    names: &[String],
    mat: &[Vec<T>],
) -> io::Result<()> {
    use std::fs::File;
    use std::io::BufWriter;

    let p = path.as_ref();
    let is_gz = p.to_string_lossy().ends_with(".gz");

    let mut out: Box<dyn Write> = if is_gz {
        let f = File::create(p)?;
        let enc = GzEncoder::new(f, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    // Header row
    write!(&mut out, "\t")?;
    for (k, name) in names.iter().enumerate() {
        if k > 0 {
            write!(&mut out, "\t")?;
        }
        write!(&mut out, "{}", name)?;
    }
    writeln!(&mut out)?;

    // Rows
    for (i, row) in mat.iter().enumerate() {
        write!(&mut out, "{}", names[i])?;
        for val in row {
            write!(&mut out, "\t{}", val)?;
        }
        writeln!(&mut out)?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_are_stripped() {
        let s = "((A:[&rate=0.1]1.0,B:1.0):[&x={1,2}]2.0,C:1.0);";
        assert_eq!(strip_annotations(s), "((A:1.0,B:1.0):2.0,C:1.0);");
    }

    #[test]
    fn list_parsing_names_and_filters() {
        let content = "\n# a comment\n(A,B);\nmy_tree = (B,C);\n\n";
        let trees = parse_newick_list(content);
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0], ("tree_0".to_string(), "(A,B);".to_string()));
        assert_eq!(trees[1], ("my_tree".to_string(), "(B,C);".to_string()));
    }
}
