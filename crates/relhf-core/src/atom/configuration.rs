//! Electron-configuration strings: `"1s2,2s2,2p6"`, `"[Ne] 3s2"`, `"2s,2p"`.

use std::fmt::{Display, Formatter};

const L_SYMBOLS: [char; 8] = ['s', 'p', 'd', 'f', 'g', 'h', 'i', 'k'];

const NOBLE_GASES: [(&str, &str); 6] = [
    ("He", "1s2"),
    ("Ne", "[He],2s2,2p6"),
    ("Ar", "[Ne],3s2,3p6"),
    ("Kr", "[Ar],3d10,4s2,4p6"),
    ("Xe", "[Kr],4d10,5s2,5p6"),
    ("Rn", "[Xe],4f14,5d10,6s2,6p6"),
];

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ConfigurationError {
    #[error("malformed configuration term '{0}'")]
    MalformedTerm(String),
    #[error("unknown noble-gas core '[{0}]'")]
    UnknownNobleGas(String),
    #[error("'{term}' needs 0 <= l < n")]
    InvalidQuantumNumbers { term: String },
    #[error("shell {shell} holds at most {max} electrons, got {count}")]
    Overfilled { shell: String, count: u32, max: u32 },
}

/// Electrons in one non-relativistic (n, l) shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellOccupancy {
    pub n: i32,
    pub l: i32,
    pub electrons: u32,
}

impl ShellOccupancy {
    pub fn capacity(&self) -> u32 {
        (4 * self.l + 2) as u32
    }

    /// Fraction of the shell that is filled, shared by both j sub-shells.
    pub fn occupation_fraction(&self) -> f64 {
        f64::from(self.electrons) / f64::from(self.capacity())
    }

    /// κ values of the shell: j = l − ½ (κ = l) first, then j = l + ½.
    pub fn kappas(&self) -> Vec<i32> {
        kappas_for_l(self.l)
    }
}

impl Display for ShellOccupancy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.n, l_symbol(self.l), self.electrons)
    }
}

pub fn kappas_for_l(l: i32) -> Vec<i32> {
    if l == 0 { vec![-1] } else { vec![l, -(l + 1)] }
}

fn l_symbol(l: i32) -> char {
    usize::try_from(l)
        .ok()
        .and_then(|l| L_SYMBOLS.get(l).copied())
        .unwrap_or('?')
}

fn split_terms(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|term| !term.is_empty())
}

/// Parses "n l [count]" where l is a spectroscopic letter.
fn parse_term(term: &str) -> Result<(i32, i32, Option<u32>), ConfigurationError> {
    let malformed = || ConfigurationError::MalformedTerm(term.to_string());
    let letter_at = term.find(|c: char| c.is_ascii_alphabetic()).ok_or_else(malformed)?;
    let (n_digits, rest) = term.split_at(letter_at);
    let mut chars = rest.chars();
    let letter = chars.next().ok_or_else(malformed)?.to_ascii_lowercase();
    let count_digits = chars.as_str();

    let n: i32 = n_digits.parse().map_err(|_| malformed())?;
    let l = L_SYMBOLS
        .iter()
        .position(|symbol| *symbol == letter)
        .ok_or_else(malformed)? as i32;
    if n < 1 || l >= n {
        return Err(ConfigurationError::InvalidQuantumNumbers {
            term: term.to_string(),
        });
    }
    let count = if count_digits.is_empty() {
        None
    } else {
        Some(count_digits.parse().map_err(|_| malformed())?)
    };
    Ok((n, l, count))
}

fn expand_noble_gas(term: &str) -> Result<Option<&'static str>, ConfigurationError> {
    let Some(inner) = term.strip_prefix('[').and_then(|t| t.strip_suffix(']')) else {
        return Ok(None);
    };
    NOBLE_GASES
        .iter()
        .find(|(symbol, _)| symbol.eq_ignore_ascii_case(inner))
        .map(|(_, expansion)| Some(*expansion))
        .ok_or_else(|| ConfigurationError::UnknownNobleGas(inner.to_string()))
}

fn collect_core(source: &str, shells: &mut Vec<ShellOccupancy>) -> Result<(), ConfigurationError> {
    for term in split_terms(source) {
        if let Some(expansion) = expand_noble_gas(term)? {
            collect_core(expansion, shells)?;
            continue;
        }
        let (n, l, count) = parse_term(term)?;
        let electrons = count.ok_or_else(|| ConfigurationError::MalformedTerm(term.to_string()))?;
        match shells.iter_mut().find(|shell| shell.n == n && shell.l == l) {
            Some(shell) => shell.electrons += electrons,
            None => shells.push(ShellOccupancy { n, l, electrons }),
        }
    }
    Ok(())
}

/// Core configuration in the order given; repeated shells accumulate.
/// Empty shells are dropped.
pub fn parse_core(source: &str) -> Result<Vec<ShellOccupancy>, ConfigurationError> {
    let mut shells = Vec::new();
    collect_core(source, &mut shells)?;
    for shell in &shells {
        if shell.electrons > shell.capacity() {
            return Err(ConfigurationError::Overfilled {
                shell: format!("{}{}", shell.n, l_symbol(shell.l)),
                count: shell.electrons,
                max: shell.capacity(),
            });
        }
    }
    shells.retain(|shell| shell.electrons > 0);
    Ok(shells)
}

/// Valence list such as `"2s,2p"`: every (n, κ) of the named shells.
pub fn parse_valence(source: &str) -> Result<Vec<(i32, i32)>, ConfigurationError> {
    let mut states = Vec::new();
    for term in split_terms(source) {
        let (n, l, count) = parse_term(term)?;
        if count.is_some() {
            return Err(ConfigurationError::MalformedTerm(term.to_string()));
        }
        for kappa in kappas_for_l(l) {
            if !states.contains(&(n, kappa)) {
                states.push((n, kappa));
            }
        }
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::{ConfigurationError, ShellOccupancy, parse_core, parse_valence};

    #[test]
    fn explicit_core_is_parsed_in_order() {
        let shells = parse_core("1s2, 2s2 2p6").expect("valid core");
        assert_eq!(
            shells,
            vec![
                ShellOccupancy { n: 1, l: 0, electrons: 2 },
                ShellOccupancy { n: 2, l: 0, electrons: 2 },
                ShellOccupancy { n: 2, l: 1, electrons: 6 },
            ]
        );
        assert_eq!(shells[2].kappas(), vec![1, -2]);
        assert_eq!(shells[2].to_string(), "2p6");
    }

    #[test]
    fn noble_gas_prefixes_expand_recursively() {
        let xe = parse_core("[Xe]").expect("xenon core");
        let total: u32 = xe.iter().map(|shell| shell.electrons).sum();
        assert_eq!(total, 54);
        assert_eq!(xe.first().map(|s| (s.n, s.l)), Some((1, 0)));

        let na_plus = parse_core("[He],2s2,2p6").expect("neon-like core");
        assert_eq!(na_plus, parse_core("[Ne]").expect("neon"));
    }

    #[test]
    fn partial_shells_have_fractional_occupation() {
        let shells = parse_core("[He],2s2,2p1").expect("boron core");
        assert!((shells[2].occupation_fraction() - 1.0 / 6.0).abs() < 1.0e-15);
    }

    #[test]
    fn empty_string_is_an_empty_core() {
        assert!(parse_core("").expect("empty core").is_empty());
        assert!(parse_core("1s0").expect("zero electrons").is_empty());
    }

    #[test]
    fn malformed_terms_are_rejected() {
        assert!(matches!(parse_core("1x2"), Err(ConfigurationError::MalformedTerm(_))));
        assert!(matches!(parse_core("1s"), Err(ConfigurationError::MalformedTerm(_))));
        assert!(matches!(parse_core("[Zz]"), Err(ConfigurationError::UnknownNobleGas(_))));
        assert!(matches!(
            parse_core("2d4"),
            Err(ConfigurationError::InvalidQuantumNumbers { .. })
        ));
        assert!(matches!(
            parse_core("1s2,1s1"),
            Err(ConfigurationError::Overfilled { count: 3, max: 2, .. })
        ));
    }

    #[test]
    fn valence_lists_expand_to_kappa_states() {
        let states = parse_valence("2s, 2p 3d").expect("valence list");
        assert_eq!(states, vec![(2, -1), (2, 1), (2, -2), (3, 2), (3, -3)]);
        assert!(parse_valence("2s1").is_err());
    }
}
