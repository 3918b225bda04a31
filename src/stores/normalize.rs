//! Comparison-ready forms of a place's identity fields.
//!
//! Nothing here fails: a field that cannot be parsed degrades to a coarser key
//! (an address without a street number is compared as a bag of words, a
//! coordinate off the globe is treated as missing).

use _model::{CanonicalPlace, Coord, PlaceId, RawPlace};

const METRES_PER_DEGREE: f64 = 111_320.0;
// columns probed either side of a cell, near the poles
const MAX_SPAN: i64 = 8;

const NAME_SUFFIXES: [&str; 9] = [
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
];

// unit designators end the street part of a street line
const UNIT_WORDS: [&str; 5] = ["ste", "fl", "unit", "apt", "rm"];

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedKey {
    pub external_id: Option<PlaceId>,
    pub name: String,
    pub address: AddressKey,
    pub address_tokens: Vec<String>,
    pub geo: Option<Coord>,
    pub cell: Option<Cell>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddressKey {
    Street {
        number: String,
        street: Vec<String>,
        postcode: Option<String>,
    },
    Full(String),
    Empty,
}

impl AddressKey {
    /// Index bucket. Leaves the postcode out since many sources omit it.
    pub fn bucket(&self) -> Option<String> {
        match self {
            Self::Street { number, street, .. } => {
                Some(format!("street:{number} {}", street.join(" ")))
            }
            Self::Full(x) => Some(format!("full:{x}")),
            Self::Empty => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cell {
    pub row: i64,
    pub col: i64,
}

#[derive(Clone, Debug)]
pub struct Normalizer {
    step: f64,
}

impl Normalizer {
    pub fn new(cell_size_m: f64) -> Self {
        Self {
            step: cell_size_m / METRES_PER_DEGREE,
        }
    }

    pub fn normalize(&self, place: &RawPlace) -> NormalizedKey {
        self.key(
            place.external_id.clone(),
            &place.name,
            &place.address,
            place.geo,
        )
    }

    pub fn normalize_canonical(&self, place: &CanonicalPlace) -> NormalizedKey {
        self.key(
            Some(place.id.clone()),
            &place.name,
            &place.address,
            place.geo,
        )
    }

    pub fn key(
        &self,
        external_id: Option<PlaceId>,
        name: &str,
        address: &str,
        geo: Option<Coord>,
    ) -> NormalizedKey {
        let (address, address_tokens) = normalize_address(address);
        let geo = geo.and_then(|x| Coord::new(x.latitude, x.longitude));
        NormalizedKey {
            external_id,
            name: normalize_name(name),
            address,
            address_tokens,
            cell: geo.map(|x| self.cell(x)),
            geo,
        }
    }

    pub fn cell(&self, coord: Coord) -> Cell {
        Cell {
            row: (coord.latitude / self.step).floor() as i64,
            col: (coord.longitude / self.step).floor() as i64,
        }
    }

    /// Every cell that can hold a point within one cell size of `coord`.
    /// Columns are a fixed number of degrees wide, so they shrink towards the
    /// poles and more of them are probed.
    pub fn neighbourhood(&self, coord: Coord) -> Vec<Cell> {
        let center = self.cell(coord);
        let cos = coord.latitude.to_radians().cos().max(1.0 / MAX_SPAN as f64);
        let span = ((1.0 / cos).ceil() as i64).min(MAX_SPAN);

        let mut output = Vec::new();
        for row in -1..=1 {
            for col in -span..=span {
                output.push(Cell {
                    row: center.row + row,
                    col: center.col + col,
                });
            }
        }
        output
    }
}

pub fn normalize_name(name: &str) -> String {
    let mut words = words(name);
    while words.len() > 1
        && words
            .last()
            .is_some_and(|x| NAME_SUFFIXES.contains(&x.as_str()))
    {
        words.pop();
    }
    words.join(" ")
}

/// Returns the address key and every normalized token of the address.
pub fn normalize_address(address: &str) -> (AddressKey, Vec<String>) {
    let segments: Vec<Vec<String>> = address
        .split(',')
        .map(|x| words(x).into_iter().map(abbreviate).collect())
        .collect();
    let tokens: Vec<String> = segments.iter().flatten().cloned().collect();
    if tokens.is_empty() {
        return (AddressKey::Empty, tokens);
    }

    let street_line = segments.iter().position(|x| {
        x.len() > 1 && x.first().is_some_and(|x| is_street_number(x))
    });
    let Some(line) = street_line else {
        return (AddressKey::Full(tokens.join(" ")), tokens);
    };

    let number = segments[line][0].clone();
    let street: Vec<String> = segments[line][1..]
        .iter()
        .take_while(|x| !UNIT_WORDS.contains(&x.as_str()))
        .cloned()
        .collect();
    if street.is_empty() {
        return (AddressKey::Full(tokens.join(" ")), tokens);
    }

    let rest: Vec<&String> = segments[line + 1..].iter().flatten().collect();
    let postcode = rest
        .iter()
        .rev()
        .find(|x| x.len() == 5 && is_digits(x))
        .or_else(|| {
            rest.iter()
                .rev()
                .find(|x| (4..=6).contains(&x.len()) && is_digits(x))
        })
        .map(|x| x.to_string());

    (
        AddressKey::Street {
            number,
            street,
            postcode,
        },
        tokens,
    )
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('&', " and ")
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|x| x.to_string())
        .collect()
}

fn abbreviate(word: String) -> String {
    match word.as_str() {
        "street" => "st",
        "avenue" => "ave",
        "av" => "ave",
        "east" => "e",
        "west" => "w",
        "north" => "n",
        "south" => "s",
        "road" => "rd",
        "boulevard" => "blvd",
        "place" => "pl",
        "drive" => "dr",
        "lane" => "ln",
        "suite" => "ste",
        "floor" => "fl",
        "parkway" => "pkwy",
        "highway" => "hwy",
        "court" => "ct",
        "square" => "sq",
        _ => return word,
    }
    .to_string()
}

fn is_digits(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

// "1", "12a", "221b"
fn is_street_number(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_ascii_digit())
        && word.chars().filter(|c| c.is_ascii_alphabetic()).count() <= 1
        && word.len() <= 6
}
