//! Top-level document codec: dispatches on the file signature between the
//! target-engine container and the native intermediate format, and writes
//! through a temporary file so a failed save never clobbers the target.

pub mod chunks;
pub mod native;
pub mod pof_read;
pub mod pof_write;

use std::fs;
use std::path::Path;

use crate::error::{PofError, Result};
use crate::model::ModelDocument;

pub use chunks::{PMF_LATEST_VERSION, POF_LATEST_VERSION};
pub use native::{read_native, write_native};
pub use pof_read::read_pof;
pub use pof_write::{write_pof, CompileFailure, Progress, SavePhase, SaveReport};

/// Loads either on-disk form, dispatching on the 4-byte signature.
pub fn load(path: impl AsRef<Path>) -> Result<ModelDocument> {
    let bytes = fs::read(path.as_ref())?;
    match bytes.get(..4) {
        Some(sig) if sig == chunks::POF_SIGNATURE => read_pof(&bytes),
        Some(sig) if sig == chunks::PMF_SIGNATURE => read_native(&bytes),
        Some(sig) => Err(PofError::Signature { found: [sig[0], sig[1], sig[2], sig[3]] }),
        None => Err(PofError::Malformed { what: "file shorter than a signature", at: 0 }),
    }
}

/// Saves the target-engine form. Stale render-tree caches are refreshed in
/// `doc`; the report lists submodels whose tree compilation failed (those
/// save with an empty tree).
pub fn save_pof(doc: &mut ModelDocument, path: impl AsRef<Path>, progress: Progress<'_>) -> Result<SaveReport> {
    let (bytes, report) = write_pof(doc, progress)?;
    write_atomic(path.as_ref(), &bytes)?;
    log::info!("saved {} bytes to {}", bytes.len(), path.as_ref().display());
    Ok(report)
}

/// Saves the native intermediate form at the latest version.
pub fn save_native(doc: &ModelDocument, path: impl AsRef<Path>) -> Result<()> {
    write_atomic(path.as_ref(), &write_native(doc))
}

/// Writes to a sibling temporary file, then renames over the target, so no
/// partial file is ever observable at `path`. The temporary is removed when
/// either step fails.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let written = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    Ok(written?)
}

/// Rejects loaded documents whose submodel cross-references are out of range
/// or whose parent chains loop. Every reference must be a valid index or the
/// -1 sentinel before the document is handed to callers.
pub(crate) fn validate_references(doc: &ModelDocument) -> Result<()> {
    let count = doc.submodels.len() as i32;
    let in_range = |r: i32| (-1..count).contains(&r);

    for sub in &doc.submodels {
        if !in_range(sub.parent) {
            return Err(PofError::Malformed { what: "submodel parent out of range", at: 0 });
        }
    }
    for start in 0..doc.submodels.len() {
        let mut idx = doc.submodels[start].parent;
        let mut steps = 0;
        while idx >= 0 {
            steps += 1;
            if steps > doc.submodels.len() {
                return Err(PofError::Malformed { what: "submodel parent chain loops", at: start });
            }
            idx = doc.submodels[idx as usize].parent;
        }
    }

    let refs = doc
        .header
        .detail_levels
        .iter()
        .chain(&doc.header.debris)
        .chain(doc.turrets.iter().flat_map(|t| [&t.parent, &t.physical_parent]))
        .chain(doc.eyes.iter().map(|e| &e.submodel))
        .chain(doc.glow_banks.iter().map(|b| &b.parent));
    for &r in refs {
        if !in_range(r) {
            return Err(PofError::Malformed { what: "submodel reference out of range", at: 0 });
        }
    }
    Ok(())
}
