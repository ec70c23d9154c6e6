//! Rows and records exchanged with the backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Shortest allowed username, in characters
pub const USERNAME_MIN: usize = 2;
/// Longest allowed username, in characters
pub const USERNAME_MAX: usize = 24;

/// Player role. New profiles are `User`; admins are promoted out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A row of the `profiles` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the auth user
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `profiles`
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile<'a> {
    pub id: &'a str,
    pub username: &'a str,
}

/// What a player drank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrinkType {
    Beer,
    Wine,
    Shot,
    Other,
}

impl DrinkType {
    /// Every type, in the order the picker shows them
    pub const ALL: [DrinkType; 4] = [
        DrinkType::Beer,
        DrinkType::Wine,
        DrinkType::Shot,
        DrinkType::Other,
    ];

    /// Name as stored in the `drinks.type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            DrinkType::Beer => "Beer",
            DrinkType::Wine => "Wine",
            DrinkType::Shot => "Shot",
            DrinkType::Other => "Other",
        }
    }
}

impl fmt::Display for DrinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `drinks` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drink {
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "type")]
    pub drink_type: DrinkType,
    pub amount: i32,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `drinks`; the photo path is patched in afterwards
#[derive(Debug, Clone, Serialize)]
pub struct NewDrink<'a> {
    pub user_id: &'a str,
    #[serde(rename = "type")]
    pub drink_type: DrinkType,
    pub amount: i32,
}

/// A row of the `leaderboard` view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub username: String,
    pub drinks_count: i64,
    pub units_total: i64,
    pub last_drink_at: Option<DateTime<Utc>>,
}

impl LeaderboardRow {
    /// Ranking order: points, then drink count, then most recent drink, all
    /// descending. A row with no drinks sorts after any row with a timestamp.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .units_total
            .cmp(&self.units_total)
            .then_with(|| other.drinks_count.cmp(&self.drinks_count))
            .then_with(|| match (&self.last_drink_at, &other.last_drink_at) {
                (Some(a), Some(b)) => b.cmp(a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }
}

/// Sort rows into ranking order. The sort is stable, so rows with equal keys
/// keep the order the backend sent them in.
pub fn rank(rows: &mut [LeaderboardRow]) {
    rows.sort_by(LeaderboardRow::rank_cmp);
}

/// One signed photo URL for the slideshow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideshowImage {
    pub url: String,
    pub photo_path: String,
}
