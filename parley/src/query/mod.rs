//! In-process query evaluation over rows already scoped to one user's collection.

mod aggregate;
mod filter;
mod sort;

pub use aggregate::{check_aggregate, run_aggregate};
pub use filter::{compile_filter, resolve_field, CompiledFilter};
pub use sort::{check_sort, sort_documents};

use crate::error::Result;
use crate::models::{CollectionSchema, Document, DocumentPage, QueryRequest};

/// Filters, sorts and pages `docs`. `total` counts every match before paging.
pub fn run_query(
    schema: &CollectionSchema,
    docs: Vec<Document>,
    request: &QueryRequest,
) -> Result<DocumentPage> {
    let filter = compile_filter(schema, &request.filter)?;
    check_sort(schema, &request.sort)?;

    let mut matching: Vec<Document> = docs.into_iter().filter(|doc| filter.matches(doc)).collect();
    sort_documents(&mut matching, &request.sort);

    let total = matching.len() as u64;
    let documents = matching
        .into_iter()
        .skip(request.skip as usize)
        .take(request.effective_limit() as usize)
        .collect();

    Ok(DocumentPage { documents, total })
}
