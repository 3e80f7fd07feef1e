//! Feeding csv line items into a draft.

use std::io;

use thiserror::Error;

use crate::composer::OrderComposer;
use crate::csv::{CsvError, ItemRow};
use crate::draft::{Attachment, DraftAction, DraftError, InstanceId, OrderDraft};
use crate::session::{SessionStore, Transport};

/// A line item row that could not be added in full.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Row(#[from] CsvError),

    #[error("line {line}: {source}")]
    Draft { line: usize, source: DraftError },

    #[error("line {line}: cannot read image {path}: {source}")]
    Image {
        line: usize,
        path: String,
        source: io::Error,
    },
}

/// Draft holders line items can be fed into.
pub trait DraftSink {
    fn dispatch(&mut self, action: DraftAction) -> Result<(), DraftError>;
    fn last_instance(&self) -> Option<InstanceId>;
}

impl DraftSink for OrderDraft {
    fn dispatch(&mut self, action: DraftAction) -> Result<(), DraftError> {
        self.apply(action)
    }

    fn last_instance(&self) -> Option<InstanceId> {
        self.line_items().last().map(|item| item.instance_id)
    }
}

impl<T: Transport, S: SessionStore> DraftSink for &OrderComposer<T, S> {
    fn dispatch(&mut self, action: DraftAction) -> Result<(), DraftError> {
        OrderComposer::dispatch(*self, action)
    }

    fn last_instance(&self) -> Option<InstanceId> {
        self.snapshot().line_items().last().map(|item| item.instance_id)
    }
}

/// Separate parsed rows from rows that failed to parse.
pub fn split_rows(
    rows: impl IntoIterator<Item = Result<ItemRow, CsvError>>,
) -> (Vec<ItemRow>, Vec<ImportError>) {
    let mut parsed = Vec::new();
    let mut problems = Vec::new();
    for row in rows {
        match row {
            Ok(row) => parsed.push(row),
            Err(e) => problems.push(e.into()),
        }
    }
    (parsed, problems)
}

/// Add one dress instance per row with its image and measurements.
///
/// Whatever could be added stays in the draft; everything that could not is
/// returned.
pub fn import_rows(
    sink: &mut impl DraftSink,
    rows: impl IntoIterator<Item = ItemRow>,
) -> Vec<ImportError> {
    let mut problems = Vec::new();
    for row in rows {
        add_row(sink, row, &mut problems);
    }
    problems
}

fn add_row(sink: &mut impl DraftSink, row: ItemRow, problems: &mut Vec<ImportError>) {
    let line = row.line;
    if let Err(source) = sink.dispatch(DraftAction::IncreaseQuantity(row.dress)) {
        problems.push(ImportError::Draft { line, source });
        return;
    }
    let Some(instance) = sink.last_instance() else {
        return;
    };

    if let Some(path) = row.image {
        match Attachment::from_path(&path) {
            Ok(image) => {
                if let Err(source) = sink.dispatch(DraftAction::SetImage {
                    instance,
                    image: Some(image),
                }) {
                    problems.push(ImportError::Draft { line, source });
                }
            }
            Err(source) => problems.push(ImportError::Image {
                line,
                path: path.display().to_string(),
                source,
            }),
        }
    }
    for (field, value) in row.measurements {
        if let Err(source) = sink.dispatch(DraftAction::SetMeasurement {
            instance,
            field,
            value,
        }) {
            problems.push(ImportError::Draft { line, source });
        }
    }
}
