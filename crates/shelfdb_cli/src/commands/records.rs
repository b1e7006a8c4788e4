//! Record commands: insert, get, select, update, delete.

use super::{OutputFormat, Session};
use crate::convert::{parse_assignment, parse_record, parse_scalar, record_json};
use shelfdb_core::{Direction, Query, Record};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Runs the insert command.
pub fn insert(session: &Session, collection: &str, record: &str) -> CommandResult {
    let stored = session.repository(collection)?.insert(parse_record(record)?)?;
    println!("{stored}");
    Ok(())
}

/// Runs the get command.
pub fn get(session: &Session, collection: &str, key: &str) -> CommandResult {
    let record = session.repository(collection)?.get(parse_scalar(key)?)?;
    println!("{record}");
    Ok(())
}

/// Runs the update command.
pub fn update(session: &Session, collection: &str, record: &str) -> CommandResult {
    let stored = session.repository(collection)?.update(parse_record(record)?)?;
    println!("{stored}");
    Ok(())
}

/// Runs the delete command.
pub fn delete(session: &Session, collection: &str, key: &str) -> CommandResult {
    let key = parse_scalar(key)?;
    session.repository(collection)?.delete(key.clone())?;
    println!("deleted {key}");
    Ok(())
}

/// Options for the select command.
#[derive(Debug)]
pub struct SelectOptions {
    /// `field=value` equality filters.
    pub equals: Vec<String>,
    /// Field to order by.
    pub order_by: Option<String>,
    /// Direction for `order_by`.
    pub direction: Direction,
    /// Results to skip.
    pub offset: usize,
    /// Maximum results.
    pub limit: Option<usize>,
    /// Output format.
    pub format: OutputFormat,
}

impl SelectOptions {
    fn query(&self) -> Result<Query, Box<dyn std::error::Error>> {
        let mut query = Query::new().offset(self.offset);
        for assignment in &self.equals {
            let (field, value) = parse_assignment(assignment)?;
            query = query.equals(field, value);
        }
        if let Some(field) = &self.order_by {
            query = query.order_by(field.clone(), self.direction);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

/// Runs the select command.
pub fn select(session: &Session, collection: &str, options: &SelectOptions) -> CommandResult {
    let records = session
        .repository(collection)?
        .select(&options.query()?)?;
    print_records(&records, options.format)
}

pub(crate) fn print_records(records: &[Record], format: OutputFormat) -> CommandResult {
    match format {
        OutputFormat::Text => {
            for record in records {
                println!("{record}");
            }
            println!("({} records)", records.len());
        }
        OutputFormat::Json => {
            let json: Vec<_> = records.iter().map(record_json).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}
