//! Dice expression parsing — "2d6+3" and friends.
//!
//! Weapon damage and spell magnitudes are written as dice expressions in
//! item/spell data. Accepted grammar: `NdS`, `NdS+M`, `NdS-M`, or a bare
//! integer constant.

use serde::{Deserialize, Serialize};

use crate::rng::RngState;

/// A parsed dice expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpr {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

/// Parse failure for a dice expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiceError {
    pub input: String,
}

impl std::fmt::Display for ParseDiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid dice expression: {:?}", self.input)
    }
}

impl std::error::Error for ParseDiceError {}

impl DiceExpr {
    pub const fn flat(value: i32) -> Self {
        Self {
            count: 0,
            sides: 0,
            modifier: value,
        }
    }

    /// Roll this expression.
    pub fn roll(&self, rng: &mut RngState) -> i32 {
        rng.roll_dice(self.count, self.sides) as i32 + self.modifier
    }

    /// Minimum possible result.
    pub fn min(&self) -> i32 {
        self.count as i32 + self.modifier
    }

    /// Maximum possible result.
    pub fn max(&self) -> i32 {
        (self.count * self.sides) as i32 + self.modifier
    }
}

impl std::str::FromStr for DiceExpr {
    type Err = ParseDiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDiceError {
            input: s.to_string(),
        };
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(err());
        }

        let Some(d_pos) = trimmed.find(['d', 'D']) else {
            // Bare constant.
            let value: i32 = trimmed.parse().map_err(|_| err())?;
            return Ok(Self::flat(value));
        };

        let count: u32 = trimmed[..d_pos].parse().map_err(|_| err())?;
        let rest = &trimmed[d_pos + 1..];

        let (sides_str, modifier) = if let Some(plus) = rest.find('+') {
            let m: i32 = rest[plus + 1..].parse().map_err(|_| err())?;
            (&rest[..plus], m)
        } else if let Some(minus) = rest.find('-') {
            let m: i32 = rest[minus + 1..].parse().map_err(|_| err())?;
            (&rest[..minus], -m)
        } else {
            (rest, 0)
        };

        let sides: u32 = sides_str.parse().map_err(|_| err())?;
        if count == 0 || sides == 0 {
            return Err(err());
        }
        Ok(Self {
            count,
            sides,
            modifier,
        })
    }
}

impl std::fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "{}", self.modifier);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier.cmp(&0) {
            std::cmp::Ordering::Greater => write!(f, "+{}", self.modifier),
            std::cmp::Ordering::Less => write!(f, "{}", self.modifier),
            std::cmp::Ordering::Equal => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> DiceExpr {
        s.parse().unwrap()
    }

    #[test]
    fn parses_standard_forms() {
        assert_eq!(
            parse("1d8"),
            DiceExpr {
                count: 1,
                sides: 8,
                modifier: 0
            }
        );
        assert_eq!(
            parse("2d6+3"),
            DiceExpr {
                count: 2,
                sides: 6,
                modifier: 3
            }
        );
        assert_eq!(
            parse("1d4-1"),
            DiceExpr {
                count: 1,
                sides: 4,
                modifier: -1
            }
        );
        assert_eq!(parse("5"), DiceExpr::flat(5));
    }

    #[test]
    fn rejects_malformed() {
        assert!("".parse::<DiceExpr>().is_err());
        assert!("d6".parse::<DiceExpr>().is_err());
        assert!("2d".parse::<DiceExpr>().is_err());
        assert!("0d6".parse::<DiceExpr>().is_err());
        assert!("2d0".parse::<DiceExpr>().is_err());
        assert!("axe".parse::<DiceExpr>().is_err());
    }

    #[test]
    fn roll_within_bounds() {
        let expr = parse("2d6+3");
        let mut rng = RngState::new(17);
        for _ in 0..500 {
            let v = expr.roll(&mut rng);
            assert!((expr.min()..=expr.max()).contains(&v));
        }
        assert_eq!(expr.min(), 5);
        assert_eq!(expr.max(), 15);
    }

    #[test]
    fn display_roundtrip() {
        for s in ["1d8", "2d6+3", "1d4-1", "7"] {
            assert_eq!(parse(s).to_string(), s);
        }
    }
}
