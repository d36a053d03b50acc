//! Canned source responses

pub const MEMORY_ALPHA_ENDPOINT: &str = "https://memory-alpha.test/api.php";
pub const TMDB_ENDPOINT: &str = "https://tmdb.test/3";
pub const TMDB_TEST_KEY: &str = "test-read-token";

/// URL fragments identifying each request type
pub const MA_SEARCH: &str = "list=search";
pub const MA_PAGE: &str = "pageids=";
pub const TMDB_BROKEN_BOW: &str = "/tv/314/season/1/episode/1";
pub const TMDB_ANY: &str = "tmdb.test";

pub const MA_SYNOPSIS: &str =
    "Captain Jonathan Archer and the crew of Enterprise NX-01 set out on their first mission.";
pub const TMDB_SYNOPSIS: &str =
    "Enterprise NX-01 is launched early to return an injured Klingon to his homeworld.";

pub fn memory_alpha_search_json() -> String {
    serde_json::json!({
        "batchcomplete": "",
        "query": {
            "searchinfo": {"totalhits": 2},
            "search": [
                {"ns": 0, "title": "Broken Bow", "pageid": 100},
                {"ns": 0, "title": "Broken Bow (episode)", "pageid": 4242}
            ]
        }
    })
    .to_string()
}

pub fn memory_alpha_empty_search_json() -> String {
    serde_json::json!({"batchcomplete": "", "query": {"search": []}}).to_string()
}

pub fn memory_alpha_page_json() -> String {
    serde_json::json!({
        "batchcomplete": "",
        "query": {
            "pages": {
                "4242": {
                    "pageid": 4242,
                    "ns": 0,
                    "title": "Broken Bow (episode)",
                    "extract": format!(
                        "{}\n\n== Summary ==\nCaptain's log, Stardate: unknown. Later, Stardate 1207.3.",
                        MA_SYNOPSIS
                    ),
                    "fullurl": "https://memory-alpha.fandom.com/wiki/Broken_Bow_(episode)"
                }
            }
        }
    })
    .to_string()
}

pub fn tmdb_episode_json() -> String {
    serde_json::json!({
        "id": 223937,
        "name": "Broken Bow",
        "overview": TMDB_SYNOPSIS,
        "air_date": "2001-09-26",
        "episode_number": 1,
        "season_number": 1,
        "runtime": 86,
        "vote_average": 7.1,
        "production_code": "721",
        "crew": [
            {"job": "Director", "name": "James L. Conway"},
            {"job": "Writer", "name": "Rick Berman"},
            {"job": "Writer", "name": "Brannon Braga"}
        ]
    })
    .to_string()
}
