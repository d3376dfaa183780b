//! Canonicalization collaborator: raw generated text in, conventionally
//! styled source out, or a syntax error.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FormatError(pub String);

/// The generator's only obligation toward this trait is handing it
/// syntactically well-formed Rust; layout is entirely the formatter's.
pub trait Canonicalize {
    fn canonicalize(&self, raw: &str) -> Result<String, FormatError>;
}

/// Default formatter: parse with `syn`, print with `prettyplease`.
#[derive(Debug, Default)]
pub struct PrettyPrinter;

impl Canonicalize for PrettyPrinter {
    fn canonicalize(&self, raw: &str) -> Result<String, FormatError> {
        let file = syn::parse_file(raw).map_err(|e| FormatError(e.to_string()))?;
        Ok(prettyplease::unparse(&file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_source_is_reformatted() {
        let out = PrettyPrinter
            .canonicalize("fn main(){let x=1;  println!(\"{x}\");}")
            .unwrap();
        assert!(out.contains("fn main()"));
        assert!(out.contains("let x = 1;"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(PrettyPrinter.canonicalize("fn main( {").is_err());
    }
}
