//! MovieLens file readers
//!
//! Reads the 100k release layout from local files: `u.data` ratings
//! (`user item rating timestamp`, tab separated) and `u.item` movie metadata
//! (`|` separated, latin-1 encoded, 19 trailing genre flags).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, StringRecord, Trim};
use tracing::info;

use crate::error::{Error, Result};
use crate::table::{Column, Id, Table};

/// Default header used by the MovieLens loaders
pub const DEFAULT_HEADER: [&str; 4] = ["user_id", "item_id", "rating", "timestamp"];

/// Genre names in `u.item` flag order
pub const GENRES: [&str; 19] = [
    "unknown",
    "Action",
    "Adventure",
    "Animation",
    "Children's",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Fantasy",
    "Film-Noir",
    "Horror",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

/// Load a `u.data` ratings file with the default header
pub fn load_ratings(path: impl AsRef<Path>) -> Result<Table> {
    load_ratings_with(path, &DEFAULT_HEADER, "\t")
}

/// Load a ratings file with custom column names and separator
pub fn load_ratings_with(
    path: impl AsRef<Path>,
    header: &[&str; 4],
    separator: &str,
) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let table = read_ratings(file, header, separator)?;
    info!("Loaded {} ratings from {}", table.len(), path.display());
    Ok(table)
}

/// Parse `user item rating timestamp` records
///
/// The separator must be a single byte. Blank lines are skipped; any other
/// malformed line fails with the line number.
pub fn read_ratings<R: Read>(reader: R, header: &[&str; 4], separator: &str) -> Result<Table> {
    let &[delimiter] = separator.as_bytes() else {
        return Err(Error::configuration(format!(
            "separator must be a single byte, got {:?}",
            separator
        )));
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(reader);

    let mut users = Vec::new();
    let mut items = Vec::new();
    let mut ratings = Vec::new();
    let mut timestamps = Vec::new();

    let mut record = StringRecord::new();
    while reader.read_record(&mut record).map_err(csv_error)? {
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = line_of(record.position());
        if record.len() != 4 {
            return Err(Error::invalid_format(format!(
                "line {}: expected 4 fields, found {}",
                line,
                record.len()
            )));
        }

        users.push(Id::parse(&record[0]));
        items.push(Id::parse(&record[1]));
        ratings.push(parse_number(&record[2], line)?);
        timestamps.push(parse_number(&record[3], line)?);
    }

    Table::new()
        .with_column(header[0], Column::Ids(users))?
        .with_column(header[1], Column::Ids(items))?
        .with_column(header[2], Column::Numbers(ratings))?
        .with_column(header[3], Column::Numbers(timestamps))
}

fn parse_number(raw: &str, line: u64) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::invalid_format(format!("line {}: invalid number '{}': {}", line, raw, e)))
}

fn line_of(position: Option<&csv::Position>) -> u64 {
    position.map(|p| p.line()).unwrap_or_default()
}

fn csv_error(e: csv::Error) -> Error {
    if e.is_io_error() {
        if let csv::ErrorKind::Io(io) = e.into_kind() {
            return Error::Io(io);
        }
        return Error::invalid_format("unreadable input");
    }
    match e.position() {
        Some(pos) => Error::invalid_format(format!("line {}: {}", pos.line(), e)),
        None => Error::invalid_format(e.to_string()),
    }
}

/// Movie metadata parsed from `u.item`
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMetadata {
    pub item_id: Id,
    pub title: String,
    pub genres: String,
    pub year: String,
}

/// Load a `u.item` file
pub fn load_items(path: impl AsRef<Path>) -> Result<Vec<ItemMetadata>> {
    read_items(File::open(path)?)
}

/// Parse `u.item` records
///
/// The file is latin-1, so field bytes are mapped to chars one to one.
pub fn read_items<R: Read>(reader: R) -> Result<Vec<ItemMetadata>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'|')
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(reader);

    let mut items = Vec::new();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record).map_err(csv_error)? {
        if record.iter().all(<[u8]>::is_empty) {
            continue;
        }
        if record.len() < 5 + GENRES.len() {
            return Err(Error::invalid_format(format!(
                "line {}: expected {} fields, found {}",
                line_of(record.position()),
                5 + GENRES.len(),
                record.len()
            )));
        }

        let genres: Vec<&str> = record
            .iter()
            .skip(5)
            .zip(GENRES.iter())
            .filter(|(flag, _)| *flag == b"1")
            .map(|(_, name)| *name)
            .collect();

        let title = latin1(&record[1]);
        items.push(ItemMetadata {
            item_id: Id::parse(&latin1(&record[0])),
            year: title_year(&title),
            title,
            genres: genres.join("|"),
        });
    }

    Ok(items)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Last `(YYYY)` in a title like `Kolya (1996)`; empty when absent
fn title_year(title: &str) -> String {
    title
        .match_indices('(')
        .rev()
        .filter_map(|(start, _)| title.get(start + 1..start + 6))
        .find(|y| {
            y.ends_with(')')
                && y.get(..4)
                    .is_some_and(|digits| digits.chars().all(|c| c.is_ascii_digit()))
        })
        .map(|y| y[..4].to_string())
        .unwrap_or_default()
}

/// Append title, genres and year columns to a ratings table
///
/// Ratings for items without metadata get empty strings.
pub fn with_item_metadata(ratings: Table, items: &[ItemMetadata], col_item: &str) -> Result<Table> {
    let lookup: HashMap<&Id, &ItemMetadata> = items.iter().map(|m| (&m.item_id, m)).collect();
    let ids = ratings.ids(col_item)?;

    let mut titles = Vec::with_capacity(ids.len());
    let mut genres = Vec::with_capacity(ids.len());
    let mut years = Vec::with_capacity(ids.len());
    for id in ids.iter() {
        match lookup.get(id) {
            Some(meta) => {
                titles.push(meta.title.clone());
                genres.push(meta.genres.clone());
                years.push(meta.year.clone());
            }
            None => {
                titles.push(String::new());
                genres.push(String::new());
                years.push(String::new());
            }
        }
    }
    drop(ids);

    ratings
        .with_column("title", Column::Text(titles))?
        .with_column("genres", Column::Text(genres))?
        .with_column("year", Column::Text(years))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const SAMPLE: &str = "196\t242\t3\t881250949\n186\t302\t3\t891717742\n\n22\t377\t1\t878887116\n";

    #[test]
    fn test_read_ratings() {
        let table = read_ratings(Cursor::new(SAMPLE), &DEFAULT_HEADER, "\t").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.column_names(), &DEFAULT_HEADER.map(String::from));
        assert_eq!(table.ids("user_id").unwrap()[0], Id::Int(196));
        assert_eq!(table.ids("item_id").unwrap()[0], Id::Int(242));
        assert_eq!(table.numbers("rating").unwrap()[0], 3.0);
        assert_eq!(table.numbers("timestamp").unwrap()[0], 881250949.0);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = read_ratings(Cursor::new("1\t2\t3\t4\n5\t6\tx\t8\n"), &DEFAULT_HEADER, "\t")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = read_ratings(Cursor::new("1,2,3\n"), &DEFAULT_HEADER, ",").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
    }

    #[test]
    fn test_custom_separator_and_padding() {
        let table = read_ratings(Cursor::new("1, a , 4.5, 10\n2,b,3,20\n"), &DEFAULT_HEADER, ",")
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.ids("item_id").unwrap()[0], Id::from("a"));
        assert_eq!(table.numbers("rating").unwrap()[0], 4.5);
    }

    #[test]
    fn test_multi_byte_separator_is_rejected() {
        let err = read_ratings(Cursor::new(SAMPLE), &DEFAULT_HEADER, "::").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_short_item_line_reports_line_number() {
        let mut data = item_line(1, b"Toy Story (1995)", "01-Jan-1995", &[3]);
        data.extend_from_slice(b"2|GoldenEye (1995)|01-Jan-1995\n");
        let err = read_items(Cursor::new(data)).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_load_ratings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE).unwrap();
        let header = ["UserId", "MovieId", "Rating", "Timestamp"];
        let table = load_ratings_with(file.path(), &header, "\t").unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.has_column("MovieId"));
    }

    fn item_line(id: u32, title: &[u8], date: &str, flags: &[usize]) -> Vec<u8> {
        let mut line = format!("{}|", id).into_bytes();
        line.extend_from_slice(title);
        line.extend_from_slice(format!("|{}||http://example.invalid", date).as_bytes());
        for g in 0..GENRES.len() {
            line.extend_from_slice(if flags.contains(&g) { b"|1" } else { b"|0" });
        }
        line.push(b'\n');
        line
    }

    #[test]
    fn test_read_items_latin1_and_genres() {
        let mut data = item_line(242, b"Kolya (1996)", "24-Jan-1997", &[5]);
        data.extend(item_line(1, b"Caf\xe9", "", &[3, 4, 5]));
        let items = read_items(Cursor::new(data)).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_id, Id::Int(242));
        assert_eq!(items[0].title, "Kolya (1996)");
        assert_eq!(items[0].genres, "Comedy");
        // taken from the title, not the 1997 release date
        assert_eq!(items[0].year, "1996");
        assert_eq!(items[1].title, "Café");
        assert_eq!(items[1].genres, "Animation|Children's|Comedy");
        assert_eq!(items[1].year, "");
    }

    #[test]
    fn test_with_item_metadata() {
        let ratings = read_ratings(Cursor::new(SAMPLE), &DEFAULT_HEADER, "\t").unwrap();
        let items = read_items(Cursor::new(item_line(242, b"Kolya (1996)", "24-Jan-1997", &[5])))
            .unwrap();
        let joined = with_item_metadata(ratings, &items, "item_id").unwrap();

        assert_eq!(
            joined.column_names().len(),
            7,
            "ratings plus title, genres, year"
        );
        let titles = joined.texts("title").unwrap();
        assert_eq!(titles[0], "Kolya (1996)");
        assert_eq!(titles[1], "");
    }
}
