use hashbrown::HashMap;
use rayon::iter::ParallelBridge;
use rayon::prelude::ParallelIterator;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use crate::knn::Neighbor;

pub type Token = String;
pub type Session = Vec<Token>;

/// Reads a training corpus: one session per line, whitespace-separated tokens.
pub fn read_corpus(corpus_path: &str) -> io::Result<Vec<Session>> {
    let line_iterator = create_buffered_line_reader(corpus_path)?;
    let mut sessions: Vec<Session> = Vec::new();
    for result in line_iterator {
        let rawline = result?;
        let session: Session = rawline.split_whitespace().map(String::from).collect();
        if !session.is_empty() {
            sessions.push(session);
        }
    }
    Ok(sessions)
}

/// Reads token vectors in word2vec text format: one `token v1 .. vD` line per
/// token, with an optional `count dim` header line. Lines that fail to parse
/// are reported and skipped.
pub fn read_token_vectors(vectors_path: &str) -> io::Result<HashMap<Token, Vec<f32>>> {
    let mut line_iterator = create_buffered_line_reader(vectors_path)?.peekable();

    if let Some(Ok(first)) = line_iterator.peek() {
        if is_vector_file_header(first) {
            line_iterator.next();
        }
    }

    let token_vectors: HashMap<Token, Vec<f32>> = line_iterator
        .par_bridge()
        .filter_map(|result| {
            if let Ok(rawline) = result {
                parse_vector_line(&rawline)
            } else {
                eprintln!("Unable to parse input!");
                None
            }
        })
        .collect();

    Ok(token_vectors)
}

fn is_vector_file_header(line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parts.len() == 2 && parts.iter().all(|part| part.parse::<usize>().is_ok())
}

fn parse_vector_line(rawline: &str) -> Option<(Token, Vec<f32>)> {
    let mut parts = rawline.split_whitespace();
    let token = parts.next()?.to_string();
    let mut vector: Vec<f32> = Vec::new();
    for part in parts {
        match part.parse::<f32>() {
            Ok(value) => vector.push(value),
            Err(_) => {
                eprintln!("Unable to parse input!");
                return None;
            }
        }
    }
    if vector.is_empty() {
        None
    } else {
        Some((token, vector))
    }
}

/// Reads a query file: one token or item id per line, kept in input order.
pub fn read_queries(queries_path: &str) -> io::Result<Vec<String>> {
    let line_iterator = create_buffered_line_reader(queries_path)?;
    let mut queries = Vec::new();
    for result in line_iterator {
        let rawline = result?;
        let query = rawline.trim();
        if !query.is_empty() {
            queries.push(query.to_string());
        }
    }
    Ok(queries)
}

/// Writes one line per query: a comma-separated `label:score` list, in the
/// order the queries were read. A query without results yields an empty line.
pub fn write_neighbor_lines(output_path: &str, results: &[Vec<Neighbor>]) -> io::Result<()> {
    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    for neighbors in results {
        let line = neighbors
            .iter()
            .map(|neighbor| format!("{}:{:.6}", neighbor.label, neighbor.distance))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

fn create_buffered_line_reader<P>(filename: P) -> io::Result<io::Lines<io::BufReader<File>>>
where
    P: AsRef<Path>,
{
    let file = File::open(filename)?;
    Ok(io::BufReader::new(file).lines())
}

#[cfg(test)]
mod io_test {
    use super::*;

    #[test]
    fn should_parse_vector_lines() {
        let parsed = parse_vector_line("v-1 0.5 -1.25 3.0").unwrap();
        assert_eq!("v-1", parsed.0);
        assert_eq!(vec![0.5, -1.25, 3.0], parsed.1);

        assert!(parse_vector_line("v-1 0.5 oops").is_none());
        assert!(parse_vector_line("lonely-token").is_none());
    }

    #[test]
    fn should_detect_vector_file_header() {
        assert!(is_vector_file_header("120 300"));
        assert!(!is_vector_file_header("v-1 0.5"));
        assert!(!is_vector_file_header("120 300 1"));
    }
}
