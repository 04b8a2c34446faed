// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static IANA timezone → `{city, flag}` mapping (spec §9 glossary).
//!
//! Unknown zones fall back to the last path segment (underscores turned to
//! spaces) as the city, and a generic flag derived from the zone's
//! continent prefix.

/// Resolve a timezone string to a `(city, flag)` pair.
pub fn resolve(tz: &str) -> (String, String) {
    for &(zone, city, flag) in KNOWN_ZONES {
        if zone == tz {
            return (city.to_owned(), flag.to_owned());
        }
    }
    fallback(tz)
}

fn fallback(tz: &str) -> (String, String) {
    let city = tz
        .rsplit('/')
        .next()
        .unwrap_or(tz)
        .replace('_', " ");
    let continent = tz.split('/').next().unwrap_or("");
    let flag = match continent {
        "Europe" => "🇪🇺",
        "Africa" => "🌍",
        "Asia" => "🌏",
        "America" => "🌎",
        "Australia" | "Pacific" => "🌏",
        "Antarctica" => "🧊",
        _ => "🌐",
    };
    (if city.is_empty() { "Unknown".to_owned() } else { city }, flag.to_owned())
}

type ZoneEntry = (&'static str, &'static str, &'static str);

const KNOWN_ZONES: &[ZoneEntry] = &[
    ("UTC", "Greenwich", "🏳️"),
    ("Europe/Berlin", "Berlin", "🇩🇪"),
    ("Europe/London", "London", "🇬🇧"),
    ("Europe/Paris", "Paris", "🇫🇷"),
    ("Europe/Madrid", "Madrid", "🇪🇸"),
    ("Europe/Rome", "Rome", "🇮🇹"),
    ("Europe/Amsterdam", "Amsterdam", "🇳🇱"),
    ("Europe/Moscow", "Moscow", "🇷🇺"),
    ("Europe/Warsaw", "Warsaw", "🇵🇱"),
    ("Europe/Stockholm", "Stockholm", "🇸🇪"),
    ("America/New_York", "New York", "🇺🇸"),
    ("America/Los_Angeles", "Los Angeles", "🇺🇸"),
    ("America/Chicago", "Chicago", "🇺🇸"),
    ("America/Denver", "Denver", "🇺🇸"),
    ("America/Toronto", "Toronto", "🇨🇦"),
    ("America/Vancouver", "Vancouver", "🇨🇦"),
    ("America/Mexico_City", "Mexico City", "🇲🇽"),
    ("America/Sao_Paulo", "São Paulo", "🇧🇷"),
    ("America/Buenos_Aires", "Buenos Aires", "🇦🇷"),
    ("Asia/Tokyo", "Tokyo", "🇯🇵"),
    ("Asia/Shanghai", "Shanghai", "🇨🇳"),
    ("Asia/Hong_Kong", "Hong Kong", "🇭🇰"),
    ("Asia/Seoul", "Seoul", "🇰🇷"),
    ("Asia/Singapore", "Singapore", "🇸🇬"),
    ("Asia/Kolkata", "Mumbai", "🇮🇳"),
    ("Asia/Dubai", "Dubai", "🇦🇪"),
    ("Asia/Bangkok", "Bangkok", "🇹🇭"),
    ("Africa/Cairo", "Cairo", "🇪🇬"),
    ("Africa/Johannesburg", "Johannesburg", "🇿🇦"),
    ("Africa/Lagos", "Lagos", "🇳🇬"),
    ("Australia/Sydney", "Sydney", "🇦🇺"),
    ("Australia/Melbourne", "Melbourne", "🇦🇺"),
    ("Pacific/Auckland", "Auckland", "🇳🇿"),
];
