//! Land-cover class catalog.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Integer class code carried by training features and classified pixels.
pub type ClassCode = u8;

/// One land-cover class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub code: ClassCode,
    pub name: String,
    /// Display colour as `#rrggbb`.
    pub color: String,
}

impl ClassInfo {
    pub fn new(code: ClassCode, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            color: color.into(),
        }
    }

    /// Parse the `#rrggbb` colour.
    pub fn rgb(&self) -> Result<[u8; 3]> {
        let hex = self.color.trim_start_matches('#');
        let bad = || Error::InvalidParameter {
            name: "color",
            value: self.color.clone(),
            reason: "expected #rrggbb".into(),
        };
        if hex.len() != 6 {
            return Err(bad());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
        Ok([channel(0)?, channel(2)?, channel(4)?])
    }
}

/// Ordered list of the classes a campaign distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCatalog {
    pub classes: Vec<ClassInfo>,
}

impl ClassCatalog {
    /// Build a catalog, rejecting duplicate codes. Classes are kept sorted by code.
    pub fn new(mut classes: Vec<ClassInfo>) -> Result<Self> {
        classes.sort_by_key(|c| c.code);
        if let Some(w) = classes.windows(2).find(|w| w[0].code == w[1].code) {
            return Err(Error::InvalidParameter {
                name: "classes",
                value: w[0].code.to_string(),
                reason: "duplicate class code".into(),
            });
        }
        if classes.iter().any(|c| c.code == u8::MAX) {
            return Err(Error::InvalidParameter {
                name: "classes",
                value: u8::MAX.to_string(),
                reason: "code 255 is reserved for nodata".into(),
            });
        }
        Ok(Self { classes })
    }

    /// The five-class water/coal/crop/forest/urban scheme.
    pub fn landcover() -> Self {
        Self {
            classes: vec![
                ClassInfo::new(0, "water", "#162bff"),
                ClassInfo::new(1, "coal", "#ffffff"),
                ClassInfo::new(2, "crop", "#ffc82d"),
                ClassInfo::new(3, "forest", "#2eff32"),
                ClassInfo::new(4, "urban", "#bf04c2"),
            ],
        }
    }

    /// Class codes in ascending order.
    pub fn codes(&self) -> Vec<ClassCode> {
        self.classes.iter().map(|c| c.code).collect()
    }

    pub fn get(&self, code: ClassCode) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.code == code)
    }

    pub fn contains(&self, code: ClassCode) -> bool {
        self.get(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::landcover()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landcover_palette_parses() {
        let catalog = ClassCatalog::landcover();
        assert_eq!(catalog.codes(), vec![0, 1, 2, 3, 4]);
        assert_eq!(catalog.get(0).unwrap().rgb().unwrap(), [0x16, 0x2b, 0xff]);
        assert_eq!(catalog.get(4).unwrap().name, "urban");
    }

    #[test]
    fn duplicate_and_reserved_codes_rejected() {
        let dup = vec![ClassInfo::new(1, "a", "#000000"), ClassInfo::new(1, "b", "#ffffff")];
        assert!(ClassCatalog::new(dup).is_err());
        assert!(ClassCatalog::new(vec![ClassInfo::new(255, "x", "#000000")]).is_err());
    }

    #[test]
    fn bad_colour_is_an_error() {
        assert!(ClassInfo::new(0, "x", "#12345").rgb().is_err());
        assert!(ClassInfo::new(0, "x", "#zz0000").rgb().is_err());
    }
}
