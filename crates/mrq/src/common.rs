//! 📦 Common data structures, the building blocks of marquee
//!
//! 🎬 COLD OPEN. INT. VIDEO RENTAL STORE, CLOSING TIME.
//!
//! Forty-five thousand movies sit in a CSV file. Each one wants to be found.
//! None of them know about search indices. They only know their title and,
//! vaguely, what genre they think they are. Relatable.
//!
//! This module defines the humble structs that carry a movie from a CSV row
//! to a bulk request body. They don't ask questions. They get serialized.
//!
//! ⚠️ The JSON field names (`ID`, `OriginalTitle`, `Genres`) are load-bearing:
//! documents already sitting in `movies` indices use them, and so does the
//! smoke query. Rename the Rust fields all you want. Leave the serde names alone. 🦆

use serde::{Deserialize, Serialize};

/// 🎬 One movie, one document, one `_id`.
///
/// `id` is the movie's zero-based position among the data rows of the dataset,
/// so re-running the same file produces the same ids and the bulk `index`
/// action overwrites instead of duplicating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "OriginalTitle")]
    pub original_title: String,
    #[serde(rename = "Genres")]
    pub genres: Vec<Genre>,
}

/// 🏷️ A genre tag, decoded from the dataset's single-quoted pseudo-JSON column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_wire_names_survive_the_rename() -> anyhow::Result<()> {
        let the_movie = Movie {
            id: 7,
            original_title: "Se7en".to_string(),
            genres: vec![Genre {
                id: 80,
                name: "Crime".to_string(),
            }],
        };

        let the_json = serde_json::to_value(&the_movie)?;
        assert_eq!(the_json["ID"], 7);
        assert_eq!(the_json["OriginalTitle"], "Se7en");
        assert_eq!(the_json["Genres"][0]["id"], 80);
        assert_eq!(the_json["Genres"][0]["name"], "Crime");

        // 🔄 and back again, because documents come home from search results too
        let the_returning_hero: Movie = serde_json::from_value(the_json)?;
        assert_eq!(the_returning_hero, the_movie);
        Ok(())
    }
}
