//! Command implementations. Each command writes JSON lines to `out`.

use std::io::Write;
use std::ops::ControlFlow;

use atproto_identity::{Did, Document, IdentityResolver, Services};
use chrono::SecondsFormat;
use plc_directory::{PlcImporter, PlcOperation};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{CliError, Result};

fn print_json(out: &mut impl Write, value: &Value) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

async fn lookup_document(resolver: &IdentityResolver, input: &str) -> Result<Document> {
    resolver
        .resolve_handle_to_document(input)
        .await?
        .ok_or_else(|| CliError::InvalidArgument(format!("{} does not resolve to a DID", input)))
}

pub fn operation_summary(op: &PlcOperation) -> Value {
    json!({
        "did": op.did,
        "cid": op.cid,
        "seq": op.seq,
        "created_at": op.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        "type": op.op_type,
        "handles": op.handles,
        "pds_endpoint": op.pds_endpoint(),
    })
}

pub async fn resolve(resolver: &IdentityResolver, handle: &str, out: &mut impl Write) -> Result<()> {
    let did = resolver.resolve_handle(handle).await?;
    let resolved_by = did.as_ref().and_then(Did::resolved_by);

    print_json(
        out,
        &json!({
            "handle": handle,
            "did": did,
            "resolved_by": resolved_by,
        }),
    )
}

pub async fn document(resolver: &IdentityResolver, input: &str, out: &mut impl Write) -> Result<()> {
    let doc = lookup_document(resolver, input).await?;

    print_json(
        out,
        &json!({
            "did": doc.did(),
            "handles": doc.handles(),
            "services": doc.services(),
            "pds_endpoint": doc.pds_endpoint(),
            "labeler_endpoint": doc.labeler_endpoint(),
        }),
    )
}

pub async fn verify(resolver: &IdentityResolver, input: &str, out: &mut impl Write) -> Result<()> {
    let doc = lookup_document(resolver, input).await?;
    let handle = resolver.get_verified_handle(&doc).await?;

    print_json(out, &json!({ "did": doc.did(), "verified_handle": handle }))
}

pub async fn status(resolver: &IdentityResolver, input: &str, out: &mut impl Write) -> Result<()> {
    let doc = lookup_document(resolver, input).await?;
    let status = resolver.account_status(&doc).await?;

    print_json(
        out,
        &json!({
            "did": doc.did(),
            "pds_endpoint": doc.pds_endpoint(),
            "status": status,
        }),
    )
}

pub async fn audit_log(importer: &mut PlcImporter, did: &str, out: &mut impl Write) -> Result<()> {
    let did = Did::new(did)?;
    let operations = importer.fetch_audit_log(&did).await?;

    for op in &operations {
        print_json(out, &operation_summary(op))?;
    }
    Ok(())
}

/// Drain the export stream, stopping after `max_pages` pages if given.
/// Returns the number of operations written.
pub async fn export(
    importer: &mut PlcImporter,
    max_pages: Option<usize>,
    out: &mut impl Write,
) -> Result<usize> {
    let mut pages = 0;
    let mut written = 0;
    let mut failure = None;

    importer
        .fetch(|operations| {
            pages += 1;
            for op in &operations {
                if let Err(e) = print_json(&mut *out, &operation_summary(op)) {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }
                written += 1;
            }

            match max_pages {
                Some(max) if pages >= max => {
                    info!("Stopping after {} pages", pages);
                    ControlFlow::Break(())
                }
                _ => ControlFlow::Continue(()),
            }
        })
        .await?;

    if let Some(e) = failure {
        return Err(e);
    }

    info!("Exported {} operations in {} pages", written, pages);
    Ok(written)
}
