//! # Miscellaneous helpers
use std::path::Path;

use anyhow::{Context, Result};

/// Infer a sample name from the filepath of an alignment file
///
/// # Examples
///
/// ```
/// let filepath = "./path/to/alignment.bam";
/// let sample_name = graphstr::utils::sample_name_from_path(filepath).unwrap();
///
/// assert_eq!("alignment", sample_name);
/// ```
pub fn sample_name_from_path(filepath: &str) -> Result<String> {
    let context = || format!("Could not infer sample name from path {filepath}");
    let name = Path::new(filepath)
        .file_stem()
        .with_context(context)?
        .to_str()
        .with_context(context)?;

    Ok(String::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_name_is_the_file_stem() {
        assert_eq!("sample7", sample_name_from_path("/data/runs/sample7.cram").unwrap());
    }
}
