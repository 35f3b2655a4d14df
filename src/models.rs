use serde::Serialize;

/// Anything with a stable catalog identity. Paged sequences deduplicate on it.
pub trait Identified {
    fn id(&self) -> i32;
}

/// List-item projection of a title.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub rating: f64,
    pub release_year: Option<String>,
}

impl Identified for Movie {
    fn id(&self) -> i32 {
        self.id
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MovieDetail {
    pub id: i32,
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub rating: f64,
    pub release_date: Option<String>,
    pub runtime: Option<i32>,
    pub genres: Vec<Genre>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct AccountDetails {
    pub id: i32,
    pub username: Option<String>,
}

pub fn extract_year(date: &str) -> Option<String> {
    let year = date.split('-').next()?.trim();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Some(year.to_string())
    } else {
        None
    }
}
