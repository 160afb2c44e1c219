use serde::Serialize;

use crate::cli::validate_path_argument;
use treelock::error::Result;
use treelock::path::{clean_file_path, clean_slash_path};

#[derive(Serialize)]
struct Normalized<'a> {
    input: &'a str,
    path: String,
}

pub fn print_normalized(paths: &[String], file: bool, json: bool) -> Result<()> {
    let mut normalized = Vec::with_capacity(paths.len());
    for input in paths {
        validate_path_argument(input)?;
        let path = if file {
            clean_file_path(input)
        } else {
            clean_slash_path(input)
        };
        normalized.push(Normalized {
            input: input.as_str(),
            path,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&normalized)?);
    } else {
        for entry in &normalized {
            println!("{}", entry.path);
        }
    }
    Ok(())
}
