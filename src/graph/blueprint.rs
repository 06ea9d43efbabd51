//! # Locus structure blueprints
//!
//! The catalog describes each locus with a regex-like structure string, e.g.
//! `AAAACC(CCG)*ATTT` or `TG(CA)+TA(GT|AT)TC`. This module tokenizes such a
//! string into an ordered list of [`Feature`]s, the linear blueprint from
//! which the sequence graph is built:
//!
//! - `(X)*` is a skippable repeat (self-loop plus bypass edge)
//! - `(X)+` is an unskippable repeat (self-loop, crossed at least once)
//! - `(X)?` is an insertion or deletion
//! - `(X|Y)` is a swap between alternatives
//! - bare sequence is a flank or an interruption, depending on position
//!
//! Ambiguity codes inside small-variant features are expanded into parallel
//! concrete sequences so that each graph node carries an unambiguous label.
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
    LeftFlank,
    RightFlank,
    Interruption,
    SkippableRepeat,
    UnskippableRepeat,
    InsertionOrDeletion,
    Swap,
}

impl FeatureType {
    /// Whether this feature corresponds to a variant that gets analyzed.
    pub fn defines_variant(&self) -> bool {
        matches!(
            self,
            FeatureType::SkippableRepeat
                | FeatureType::UnskippableRepeat
                | FeatureType::InsertionOrDeletion
                | FeatureType::Swap
        )
    }

    pub fn is_repeat(&self) -> bool {
        matches!(self, FeatureType::SkippableRepeat | FeatureType::UnskippableRepeat)
    }
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub feature_type: FeatureType,
    pub sequences: Vec<String>,
    /// Graph nodes carrying this feature, one per sequence; assigned by
    /// [`super::build_graph`].
    pub node_ids: Vec<super::NodeId>,
}

pub type GraphBlueprint = Vec<Feature>;

const IUPAC_CODES: &str = "ACGTRYSWKMBDHVN";

/// Cap on the number of parallel nodes a single ambiguous feature may expand
/// into.
const MAX_EXPANSIONS: usize = 16;

fn expand_base(base: char) -> &'static str {
    match base {
        'A' => "A",
        'C' => "C",
        'G' => "G",
        'T' => "T",
        'R' => "AG",
        'Y' => "CT",
        'S' => "CG",
        'W' => "AT",
        'K' => "GT",
        'M' => "AC",
        'B' => "CGT",
        'D' => "AGT",
        'H' => "ACT",
        'V' => "ACG",
        'N' => "ACGT",
        _ => "",
    }
}

/// Expand ambiguity codes into all concrete sequences.
fn expand_iupac(sequence: &str) -> Result<Vec<String>> {
    let mut expansions = vec![String::new()];
    for base in sequence.chars() {
        let concrete = expand_base(base);
        if concrete.is_empty() {
            return Err(Error::MalformedStructure(format!(
                "symbol '{base}' is not a valid IUPAC code"
            )));
        }
        let mut next = Vec::with_capacity(expansions.len() * concrete.len());
        for prefix in &expansions {
            for concrete_base in concrete.chars() {
                let mut extended = prefix.clone();
                extended.push(concrete_base);
                next.push(extended);
            }
        }
        if next.len() > MAX_EXPANSIONS {
            return Err(Error::MalformedStructure(format!(
                "sequence {sequence} expands into more than {MAX_EXPANSIONS} concrete sequences"
            )));
        }
        expansions = next;
    }
    Ok(expansions)
}

fn check_sequence(sequence: &str) -> Result<()> {
    if sequence.is_empty() {
        return Err(Error::MalformedStructure(
            "encountered an empty sequence token".to_string(),
        ));
    }
    for symbol in sequence.chars() {
        if !IUPAC_CODES.contains(symbol) {
            return Err(Error::MalformedStructure(format!(
                "symbol '{symbol}' is not a valid IUPAC code"
            )));
        }
    }
    Ok(())
}

enum Token {
    Bare(String),
    Group { alternatives: Vec<String>, quantifier: Option<char> },
}

fn tokenize(structure: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = structure.chars().peekable();

    while let Some(&symbol) = chars.peek() {
        if symbol == '(' {
            chars.next();
            let mut body = String::new();
            loop {
                match chars.next() {
                    Some(')') => break,
                    Some('(') => {
                        return Err(Error::MalformedStructure(format!(
                            "nested parentheses in {structure}"
                        )))
                    }
                    Some(inner) => body.push(inner),
                    None => {
                        return Err(Error::MalformedStructure(format!(
                            "unbalanced parentheses in {structure}"
                        )))
                    }
                }
            }
            let quantifier = match chars.peek().copied() {
                Some(quantifier @ ('*' | '+' | '?')) => {
                    chars.next();
                    Some(quantifier)
                }
                _ => None,
            };
            let alternatives: Vec<String> = body.split('|').map(str::to_string).collect();
            for alternative in &alternatives {
                check_sequence(alternative)?;
            }
            tokens.push(Token::Group { alternatives, quantifier });
        } else if symbol == ')' {
            return Err(Error::MalformedStructure(format!(
                "unbalanced parentheses in {structure}"
            )));
        } else {
            let mut run = String::new();
            while let Some(&bare) = chars.peek() {
                if bare == '(' || bare == ')' {
                    break;
                }
                run.push(bare);
                chars.next();
            }
            check_sequence(&run)?;
            tokens.push(Token::Bare(run));
        }
    }

    Ok(tokens)
}

/// Decode a locus structure string into its blueprint.
pub fn decode_features(structure: &str) -> Result<GraphBlueprint> {
    let tokens = tokenize(structure)?;
    if tokens.len() < 2 {
        return Err(Error::MalformedStructure(format!(
            "locus structure {structure} must contain flanks and at least one feature"
        )));
    }

    let last_index = tokens.len() - 1;
    let mut blueprint = GraphBlueprint::new();
    for (index, token) in tokens.into_iter().enumerate() {
        let feature = match token {
            Token::Bare(sequence) => {
                let feature_type = if index == 0 {
                    FeatureType::LeftFlank
                } else if index == last_index {
                    FeatureType::RightFlank
                } else {
                    FeatureType::Interruption
                };
                Feature { feature_type, sequences: vec![sequence], node_ids: Vec::new() }
            }
            Token::Group { alternatives, quantifier } => {
                let (feature_type, sequences) = match (quantifier, alternatives.len()) {
                    (Some('*'), 1) => (FeatureType::SkippableRepeat, alternatives),
                    (Some('+'), 1) => (FeatureType::UnskippableRepeat, alternatives),
                    (Some('?'), 1) => {
                        (FeatureType::InsertionOrDeletion, expand_iupac(&alternatives[0])?)
                    }
                    (None, n) if n >= 2 => {
                        let mut expanded = Vec::new();
                        for alternative in &alternatives {
                            expanded.extend(expand_iupac(alternative)?);
                        }
                        if expanded.len() > MAX_EXPANSIONS {
                            return Err(Error::MalformedStructure(format!(
                                "swap in {structure} expands into too many sequences"
                            )));
                        }
                        (FeatureType::Swap, expanded)
                    }
                    _ => {
                        return Err(Error::MalformedStructure(format!(
                            "group in {structure} must be a quantified repeat, an optional \
                             segment, or a swap"
                        )))
                    }
                };
                Feature { feature_type, sequences, node_ids: Vec::new() }
            }
        };
        blueprint.push(feature);
    }

    if blueprint.first().map(|f| f.feature_type) != Some(FeatureType::LeftFlank)
        || blueprint.last().map(|f| f.feature_type) != Some(FeatureType::RightFlank)
    {
        return Err(Error::MalformedStructure(format!(
            "locus structure {structure} must start and end with flank sequence"
        )));
    }

    Ok(blueprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_structure_is_decoded() {
        let blueprint = decode_features("AAAACC(CCG)*ATTT").unwrap();
        assert_eq!(3, blueprint.len());
        assert_eq!(FeatureType::LeftFlank, blueprint[0].feature_type);
        assert_eq!(FeatureType::SkippableRepeat, blueprint[1].feature_type);
        assert_eq!(vec!["CCG".to_string()], blueprint[1].sequences);
        assert_eq!(FeatureType::RightFlank, blueprint[2].feature_type);
    }

    #[test]
    fn structure_with_interruption_and_swap_is_decoded() {
        let blueprint = decode_features("TG(CA)+TA(GT|AT)TC").unwrap();
        let types: Vec<FeatureType> = blueprint.iter().map(|f| f.feature_type).collect();
        assert_eq!(
            vec![
                FeatureType::LeftFlank,
                FeatureType::UnskippableRepeat,
                FeatureType::Interruption,
                FeatureType::Swap,
                FeatureType::RightFlank,
            ],
            types
        );
        assert_eq!(vec!["GT".to_string(), "AT".to_string()], blueprint[3].sequences);
    }

    #[test]
    fn ambiguous_swap_is_expanded() {
        let blueprint = decode_features("TG(AR|C)TC").unwrap();
        assert_eq!(
            vec!["AA".to_string(), "AG".to_string(), "C".to_string()],
            blueprint[1].sequences
        );
    }

    #[test]
    fn optional_segment_becomes_insertion_or_deletion() {
        let blueprint = decode_features("TG(AGG)?TC").unwrap();
        assert_eq!(FeatureType::InsertionOrDeletion, blueprint[1].feature_type);
    }

    #[test]
    fn unbalanced_parentheses_are_rejected() {
        assert!(matches!(
            decode_features("AC(CCG*ATTT"),
            Err(Error::MalformedStructure(_))
        ));
        assert!(decode_features("ACCCG)*ATTT").is_err());
    }

    #[test]
    fn empty_tokens_are_rejected() {
        assert!(decode_features("AC()*GT").is_err());
        assert!(decode_features("AC(|GT)TT").is_err());
    }

    #[test]
    fn structure_without_flanks_is_rejected() {
        assert!(decode_features("(CCG)*").is_err());
        assert!(decode_features("(CCG)*ATTT").is_err());
    }
}
