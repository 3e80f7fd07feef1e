use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::Amount;
use crate::draft::Totals;
use crate::model::{Dress, DressId, MeasurementField, OrderSummary};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: invalid price {price} for dress '{dress}'")]
    InvalidPrice {
        line: usize,
        dress: DressId,
        price: f64,
    },

    #[error("line {line}: missing dress")]
    MissingDress { line: usize },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: DressId,
    name: String,
    price: f64,
    #[serde(default)]
    r#type: String,
}

/// One dress unit of an offline quote.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub line: usize,
    pub dress: DressId,
    /// Resolved against the csv file's directory
    pub image: Option<PathBuf>,
    pub measurements: Vec<(MeasurementField, String)>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Dress,
    Image,
    Measurement(MeasurementField),
}

#[derive(Debug, Serialize)]
struct QuoteRow {
    items: usize,
    base_total: String,
    extra_charges: String,
    discount: String,
    before_discount: String,
    after_discount: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct OrderRow<'a> {
    order: &'a str,
    customer: &'a str,
    status: &'a str,
    dresses: String,
    amount: String,
    created: &'a str,
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Read catalog dresses (`id,name,price,type`) from a csv file
pub fn read_catalog(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Dress, CsvError>>, CsvError> {
    let reader = open(path.as_ref())?;

    Ok(reader
        .into_deserialize::<CatalogRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            if !row.price.is_finite() || row.price < 0.0 {
                return Err(CsvError::InvalidPrice {
                    line,
                    dress: row.id,
                    price: row.price,
                });
            }
            Ok(Dress {
                id: row.id,
                dress_name: row.name,
                dress_price: Amount::from_float(row.price),
                dress_type: row.r#type,
            })
        }))
}

/// Read line items from a csv file: a `dress` column, an optional `image`
/// column and any of the measurement keys as further columns.
pub fn read_line_items(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<ItemRow, CsvError>>, CsvError> {
    let path = path.as_ref();
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut reader = open(path)?;

    let columns = reader
        .headers()
        .map_err(|source| CsvError::Parse { line: 1, source })?
        .iter()
        .map(|header| match header {
            "dress" => Ok(Column::Dress),
            "image" => Ok(Column::Image),
            other => other
                .parse()
                .map(Column::Measurement)
                .map_err(|_| CsvError::UnknownColumn(other.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(reader
        .into_records()
        .enumerate()
        .map(move |(idx, result)| {
            let line = idx + 2;
            let record = result.map_err(|source| CsvError::Parse { line, source })?;

            let mut dress = None;
            let mut image = None;
            let mut measurements = Vec::new();
            for (column, value) in columns.iter().zip(record.iter()) {
                match column {
                    Column::Dress if !value.is_empty() => dress = Some(value.to_string()),
                    Column::Image if !value.is_empty() => image = Some(base.join(value)),
                    Column::Measurement(field) if !value.is_empty() => {
                        measurements.push((*field, value.to_string()))
                    }
                    _ => {}
                }
            }

            Ok(ItemRow {
                line,
                dress: dress.ok_or(CsvError::MissingDress { line })?,
                image,
                measurements,
            })
        }))
}

/// Write a one-row quote summary in csv format
pub fn write_quote(
    writer: impl io::Write,
    items: usize,
    totals: &Totals,
    status: &str,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.serialize(QuoteRow {
        items,
        base_total: totals.base_total.to_string(),
        extra_charges: totals.extra_charges.to_string(),
        discount: totals
            .discount_percent
            .map(|p| p.to_string())
            .unwrap_or_default(),
        before_discount: totals.before_discount.to_string(),
        after_discount: totals.after_discount.to_string(),
        status: status.to_string(),
    })?;
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write an order listing in csv format
pub fn write_orders<'a>(
    writer: impl io::Write,
    orders: impl IntoIterator<Item = &'a OrderSummary>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for order in orders {
        writer.serialize(OrderRow {
            order: &order.order_id,
            customer: order.customer.as_ref().map(|c| c.id()).unwrap_or_default(),
            status: order.status.as_str(),
            dresses: order
                .dress_count
                .map(|n| n.to_string())
                .unwrap_or_default(),
            amount: order.payable().to_string(),
            created: order.created_at.as_deref().unwrap_or_default(),
        })?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
