//! Deterministic fantasy names for generated NPCs, items and places.
//!
//! All generation is deterministic (same stream seed = same names).

use crate::rng::SeededRng;

pub struct NameGenerator;

impl NameGenerator {
    /// Given name plus epithet, e.g. "Maren the Bold".
    pub fn character_name(rng: &mut SeededRng) -> String {
        let given = rng.pick(GIVEN_NAMES);
        let epithet = rng.pick(EPITHETS);
        format!("{given} the {epithet}")
    }

    pub fn given_name(rng: &mut SeededRng) -> &'static str {
        *rng.pick(GIVEN_NAMES)
    }

    /// "Rusted Dagger", "Gilded Lantern of Embers".
    pub fn item_name(rng: &mut SeededRng, kind: &str) -> String {
        let adjective = rng.pick(ITEM_ADJECTIVES);
        let noun = match kind {
            "weapon" => rng.pick(WEAPONS),
            "armor"  => rng.pick(ARMOR),
            _        => rng.pick(TRINKETS),
        };
        if rng.chance(0.25) {
            format!("{adjective} {noun} of {}", rng.pick(AFFIXES))
        } else {
            format!("{adjective} {noun}")
        }
    }

    /// "Ashford Crossing", "Mirewood Hollow".
    pub fn area_name(rng: &mut SeededRng) -> String {
        format!("{}{} {}", rng.pick(PLACE_STEMS), rng.pick(PLACE_ENDINGS), rng.pick(PLACE_KINDS))
    }
}

const GIVEN_NAMES: &[&str] = &[
    "Aldric", "Maren", "Tobin", "Isolde", "Corwin", "Elspeth", "Garrick", "Wynne",
    "Rowan", "Brisa", "Osric", "Tamsin", "Hale", "Yselda", "Fenwick", "Liora",
    "Bram", "Sigrun", "Dace", "Marisol", "Edric", "Nell", "Quill", "Ottilie",
];

const EPITHETS: &[&str] = &[
    "Bold", "Grey", "Quiet", "Lame", "Fair", "Red", "Unbroken", "Wanderer",
    "Elder", "Young", "Lucky", "Sly",
];

const ITEM_ADJECTIVES: &[&str] = &[
    "Rusted", "Gilded", "Worn", "Polished", "Ancient", "Cracked", "Blessed", "Crude",
];

const WEAPONS: &[&str] = &["Dagger", "Longsword", "Hand Axe", "Spear", "Cudgel", "Shortbow"];

const ARMOR: &[&str] = &["Buckler", "Helm", "Gauntlets", "Chainmail", "Boots"];

const TRINKETS: &[&str] = &["Lantern", "Amulet", "Ring", "Compass", "Flask", "Map Case"];

const AFFIXES: &[&str] = &["Embers", "the Tide", "Whispers", "the North", "Thorns"];

const PLACE_STEMS: &[&str] = &["Ash", "Mire", "Stone", "Raven", "Elder", "Salt", "Thorn"];

const PLACE_ENDINGS: &[&str] = &["ford", "wood", "hold", "mere", "gate", "vale"];

const PLACE_KINDS: &[&str] = &["Crossing", "Hollow", "Market", "Keep", "Fields"];
