//! Row filtering of tag-soup HTML tables, built on `kuchikiki`.
//!
//! HTML is parsed the way browsers do, so any input yields a document. Entries are table
//! rows an extractor recognizes, optionally followed by a detail row that belongs to them.
//! The parsed tree is not `Send`; collecting entries and removing them are separate passes
//! over separately parsed trees, which see the same rows in the same order.

use std::rc::Rc;

use kuchikiki::{traits::*, NodeRef};
use tracing::debug;

use crate::error::{self, Error};

use super::{in_order, Decider, ResourceRef};

/// Recognizes the entries of an HTML table.
pub trait HtmlRows: Send + Sync {
    /// The resources a `tr` element refers to, or `None` when it is not an entry row.
    fn resources(&self, row: &NodeRef) -> Option<Vec<ResourceRef>>;

    /// Whether an entry row is followed by a detail row that shares its fate.
    fn paired(&self) -> bool {
        false
    }
}

struct Entry {
    resources: Vec<ResourceRef>,
    rows: Vec<NodeRef>,
}

fn entries(document: &NodeRef, rows: &dyn HtmlRows) -> Result<Vec<Entry>, Error> {
    let candidates: Vec<NodeRef> = document
        .select("tr")
        .map_err(|_| error::unclassified(anyhow::anyhow!("invalid row selector")))?
        .map(|row| row.as_node().clone())
        .collect();

    let mut entries = vec![];
    let mut index = 0;

    while index < candidates.len() {
        let row = &candidates[index];
        index += 1;

        let Some(resources) = rows.resources(row) else {
            continue;
        };
        let mut entry = Entry {
            resources,
            rows: vec![row.clone()],
        };

        if rows.paired() {
            if let Some(next) = candidates.get(index) {
                let adjacent = row
                    .following_siblings()
                    .elements()
                    .next()
                    .is_some_and(|sibling| Rc::ptr_eq(&sibling.as_node().0, &next.0));

                if adjacent && rows.resources(next).is_none() {
                    entry.rows.push(next.clone());
                    index += 1;
                }
            }
        }

        entries.push(entry);
    }

    Ok(entries)
}

/// Remove the entries of the HTML `body` that refer to resources `decider` does not permit.
pub async fn filter(
    body: &[u8],
    rows: &dyn HtmlRows,
    decider: &Decider<'_>,
) -> Result<Vec<u8>, Error> {
    let html = String::from_utf8_lossy(body).into_owned();

    let resources: Vec<Vec<ResourceRef>> = {
        let document = kuchikiki::parse_html().one(html.as_str());
        entries(&document, rows)?
            .into_iter()
            .map(|entry| entry.resources)
            .collect()
    };

    let verdicts = decider.verdicts(&resources).await?;

    retain(&html, rows, verdicts)
}

fn retain(html: &str, rows: &dyn HtmlRows, verdicts: Vec<bool>) -> Result<Vec<u8>, Error> {
    let document = kuchikiki::parse_html().one(html);
    let mut keep = in_order(verdicts);
    let mut removed = 0;

    for entry in entries(&document, rows)? {
        if !keep() {
            for row in entry.rows {
                row.detach();
            }
            removed += 1;
        }
    }
    debug!(removed, "filtered HTML response");

    let mut out = Vec::with_capacity(html.len());
    document.serialize(&mut out).map_err(error::unclassified)?;
    Ok(out)
}

/// The trimmed text of the first link in `row`.
pub fn link_text(row: &NodeRef) -> Option<String> {
    let link = row.select_first("a").ok()?;
    let text = link.as_node().text_contents();
    Some(text.trim().to_string())
}

/// The `href` of the first link in `row`.
pub fn link_href(row: &NodeRef) -> Option<String> {
    let link = row.select_first("a").ok()?;
    let attributes = link.attributes.borrow();
    attributes.get("href").map(str::to_string)
}
