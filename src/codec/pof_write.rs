//! Target-engine container writer. Dirty submodels are repaired, compiled
//! and packed first; clean submodels embed their cached bytes verbatim, so
//! resaving an unmodified document is byte-stable and never re-invokes the
//! compiler.

use glam::Vec3;

use crate::binary::{flip_bbox, flip_x, Writer};
use crate::error::{PofError, Result};
use crate::geo::repair_polygons;
use crate::model::{ModelDocument, RenderCache, TurretKind};
use crate::tree::{build_shield_tree, compile, pack_shield_tree, pack_submodel, RenderNode};

use super::chunks::*;

/// Coarse save phases, reported once each through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    CompileTrees,
    WriteChunks,
}

pub type Progress<'a> = Option<&'a mut dyn FnMut(SavePhase)>;

/// One submodel whose render tree could not be compiled. The document still
/// saves; the submodel's geometry chunk carries an empty tree.
#[derive(Debug)]
pub struct CompileFailure {
    pub submodel: usize,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct SaveReport {
    pub compile_failures: Vec<CompileFailure>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.compile_failures.is_empty()
    }
}

/// Serializes the whole document. Refreshes stale render-tree caches as a
/// side effect; a clean cache entry is embedded byte-for-byte.
pub fn write_pof(doc: &mut ModelDocument, mut progress: Progress<'_>) -> Result<(Vec<u8>, SaveReport)> {
    notify(&mut progress, SavePhase::CompileTrees);
    let report = refresh_caches(doc)?;

    notify(&mut progress, SavePhase::WriteChunks);
    let mut w = Writer::new();
    w.write_bytes(&POF_SIGNATURE);
    w.write_i32(POF_LATEST_VERSION);

    write_header(&mut w, doc);
    if !doc.textures.is_empty() {
        chunk(&mut w, CHUNK_TEXTURES, |b| {
            write_list(b, &doc.textures, |b, t| b.write_string(t));
        });
    }
    for idx in 0..doc.submodels.len() {
        write_submodel(&mut w, doc, idx);
    }
    write_metadata(&mut w, doc)?;
    write_info(&mut w, doc);

    Ok((w.into_bytes(), report))
}

fn notify(progress: &mut Progress<'_>, phase: SavePhase) {
    if let Some(f) = progress {
        f(phase);
    }
}

/// Repairs, compiles and packs every dirty submodel. A depth-cap failure is
/// recorded and leaves that submodel with an empty tree and a still-dirty
/// cache; unrecoverable geometry aborts the save.
fn refresh_caches(doc: &mut ModelDocument) -> Result<SaveReport> {
    let mut report = SaveReport::default();
    for idx in 0..doc.submodels.len() {
        if !doc.render_cache[idx].changed {
            continue;
        }
        let polys = repair_polygons(&doc.submodels[idx].polygons)?;
        match compile(&polys) {
            Ok((mut tree, stats)) => {
                let data = pack_submodel(&polys, &mut tree)?;
                log::debug!(
                    "recompiled submodel {idx} ({:?}): {} polys, depth {}, {} bytes",
                    doc.submodels[idx].name,
                    polys.len(),
                    stats.max_depth,
                    data.len()
                );
                doc.render_cache[idx] = RenderCache { data, changed: false };
            }
            Err(PofError::CompileDepth { depth }) => {
                log::error!(
                    "submodel {idx} ({:?}) exceeded the compile depth cap at {depth}; saving an empty tree",
                    doc.submodels[idx].name
                );
                report.compile_failures.push(CompileFailure {
                    submodel: idx,
                    detail: format!("render-tree depth {depth} exceeds the cap"),
                });
                // Minimal valid stream: empty pool plus the end marker. The
                // cache stays dirty so the next save tries again.
                let data = pack_submodel(&[], &mut RenderNode::empty())?;
                doc.render_cache[idx] = RenderCache { data, changed: true };
            }
            Err(other) => return Err(other),
        }
    }
    Ok(report)
}

fn write_header(w: &mut Writer, doc: &ModelDocument) {
    let header = &doc.header;
    chunk(w, CHUNK_HEADER, |b| {
        b.write_f32(header.effective_radius());
        b.write_u32(header.flags);
        b.write_u32(doc.submodels.len() as u32);
        b.write_bbox(flip_bbox(header.effective_bbox()));
        write_list(b, &header.detail_levels, |b, &i| b.write_i32(i));
        write_list(b, &header.debris, |b, &i| b.write_i32(i));
        b.write_f32(header.mass);
        b.write_vec3(flip_x(header.mass_center));
        // Three row vectors.
        let moi = header.moi.transpose();
        b.write_vec3(moi.x_axis);
        b.write_vec3(moi.y_axis);
        b.write_vec3(moi.z_axis);
        write_list(b, &header.cross_sections, |b, cs| {
            b.write_f32(cs.depth);
            b.write_f32(cs.radius);
        });
        // Legacy header light list, always empty.
        b.write_i32(0);
    });
}

fn write_submodel(w: &mut Writer, doc: &ModelDocument, idx: usize) {
    let sub = &doc.submodels[idx];
    let cache = &doc.render_cache[idx];
    chunk(w, CHUNK_SUBMODEL, |b| {
        b.write_u32(idx as u32);
        b.write_f32(sub.effective_radius());
        b.write_i32(sub.parent);
        b.write_vec3(flip_x(sub.offset));
        b.write_vec3(flip_x(sub.geo_center));
        b.write_bbox(flip_bbox(sub.effective_bbox()));
        b.write_string(&sub.name);
        b.write_string(&sub.properties);
        b.write_i32(sub.movement_type as i32);
        b.write_i32(sub.movement_axis as i32);
        b.write_i32(0); // reserved
        b.write_i32(cache.data.len() as i32);
        b.write_bytes(&cache.data);
    });
}

fn write_metadata(w: &mut Writer, doc: &ModelDocument) -> Result<()> {
    if !doc.specials.is_empty() {
        chunk(w, CHUNK_SPECIALS, |b| {
            write_list(b, &doc.specials, |b, sp| {
                b.write_string(&sp.name);
                b.write_string(&sp.properties);
                b.write_vec3(flip_x(sp.position));
                b.write_f32(sp.radius);
            });
        });
    }
    if !doc.eyes.is_empty() {
        chunk(w, CHUNK_EYES, |b| {
            write_list(b, &doc.eyes, |b, eye| {
                b.write_i32(eye.submodel);
                b.write_vec3(flip_x(eye.offset));
                b.write_vec3(flip_x(eye.normal));
            });
        });
    }
    for (id, banks) in [
        (CHUNK_PRIMARY_POINTS, &doc.primary_banks),
        (CHUNK_SECONDARY_POINTS, &doc.secondary_banks),
    ] {
        if !banks.is_empty() {
            chunk(w, id, |b| {
                write_list(b, banks, |b, bank| {
                    write_list(b, &bank.points, |b, p| {
                        b.write_vec3(flip_x(p.position));
                        b.write_vec3(flip_x(p.normal));
                    });
                });
            });
        }
    }
    for (id, kind) in [
        (CHUNK_GUN_TURRETS, TurretKind::Gun),
        (CHUNK_MISSILE_TURRETS, TurretKind::Missile),
    ] {
        let turrets: Vec<_> = doc.turrets.iter().filter(|t| t.kind == kind).collect();
        if !turrets.is_empty() {
            chunk(w, id, |b| {
                write_list(b, &turrets, |b, t| {
                    b.write_i32(t.parent);
                    b.write_i32(t.physical_parent);
                    b.write_vec3(flip_x(t.normal));
                    write_list(b, &t.fire_points, |b, &p| b.write_vec3(flip_x(p)));
                });
            });
        }
    }
    if !doc.docks.is_empty() {
        chunk(w, CHUNK_DOCKS, |b| {
            write_list(b, &doc.docks, |b, dock| {
                b.write_string(&dock.properties);
                write_list(b, &dock.paths, |b, &p| b.write_i32(p));
                write_list(b, &dock.points, |b, p| {
                    b.write_vec3(flip_x(p.position));
                    b.write_vec3(flip_x(p.normal));
                });
            });
        });
    }
    if !doc.thrusters.is_empty() {
        chunk(w, CHUNK_THRUSTERS, |b| {
            write_list(b, &doc.thrusters, |b, bank| {
                b.write_i32(bank.glows.len() as i32);
                b.write_string(&bank.properties);
                for glow in &bank.glows {
                    b.write_vec3(flip_x(glow.position));
                    b.write_vec3(flip_x(glow.normal));
                    b.write_f32(glow.radius);
                }
            });
        });
    }
    if !doc.shield.verts.is_empty() {
        chunk(w, CHUNK_SHIELD, |b| {
            write_list(b, &doc.shield.verts, |b, &v| b.write_vec3(flip_x(v)));
            write_list(b, &doc.shield.faces, |b, face| {
                b.write_vec3(flip_x(face.normal));
                for &v in &face.verts {
                    b.write_u32(v);
                }
                for &n in &face.neighbors {
                    b.write_i32(n);
                }
            });
        });
    }
    if !doc.shield.faces.is_empty() {
        let mut tree = build_shield_tree(&doc.shield.faces, &doc.shield.verts)?;
        let data = pack_shield_tree(&mut tree)?;
        chunk(w, CHUNK_SHIELD_TREE, |b| {
            b.write_i32(data.len() as i32);
            b.write_bytes(&data);
        });
    }
    if doc.auto_center != Vec3::ZERO {
        chunk(w, CHUNK_AUTO_CENTER, |b| b.write_vec3(flip_x(doc.auto_center)));
    }
    if !doc.insignias.is_empty() {
        chunk(w, CHUNK_INSIGNIA, |b| {
            write_list(b, &doc.insignias, |b, insignia| {
                b.write_i32(insignia.detail_level);
                b.write_i32(insignia.faces.len() as i32);
                write_list(b, &insignia.verts, |b, &v| b.write_vec3(flip_x(v)));
                b.write_vec3(flip_x(insignia.offset));
                for face in &insignia.faces {
                    for corner in face {
                        b.write_u32(corner.vert);
                        b.write_f32(corner.u);
                        b.write_f32(corner.v);
                    }
                }
            });
        });
    }
    if !doc.paths.is_empty() {
        chunk(w, CHUNK_PATHS, |b| {
            write_list(b, &doc.paths, |b, path| {
                b.write_string(&path.name);
                b.write_string(&path.parent);
                write_list(b, &path.points, |b, point| {
                    b.write_vec3(flip_x(point.position));
                    b.write_f32(point.radius);
                    write_list(b, &point.turrets, |b, &t| b.write_i32(t));
                });
            });
        });
    }
    if !doc.glow_banks.is_empty() {
        chunk(w, CHUNK_GLOWS, |b| {
            write_list(b, &doc.glow_banks, |b, bank| {
                b.write_i32(bank.disp_time);
                b.write_u32(bank.on_time);
                b.write_u32(bank.off_time);
                b.write_i32(bank.parent);
                b.write_u32(bank.lod);
                b.write_u32(bank.kind);
                b.write_u32(bank.points.len() as u32);
                b.write_string(&bank.properties);
                for point in &bank.points {
                    b.write_vec3(flip_x(point.position));
                    b.write_vec3(flip_x(point.normal));
                    b.write_f32(point.radius);
                }
            });
        });
    }
    Ok(())
}

/// NUL-separated build-info strings plus the cache-compatibility marker the
/// reader looks for.
fn write_info(w: &mut Writer, doc: &ModelDocument) {
    chunk(w, CHUNK_INFO, |b| {
        for line in &doc.pof_info {
            b.write_bytes(line.as_bytes());
            b.write_u8(0);
        }
        b.write_bytes(CACHE_MARKER.as_bytes());
        b.write_u8(0);
    });
}

fn chunk(w: &mut Writer, id: [u8; 4], body: impl FnOnce(&mut Writer)) {
    let mut b = Writer::new();
    body(&mut b);
    w.write_bytes(&id);
    w.write_i32(b.len() as i32);
    w.write_bytes(&b.into_bytes());
}

fn write_list<T>(w: &mut Writer, items: &[T], f: impl Fn(&mut Writer, &T)) {
    w.write_i32(items.len() as i32);
    for item in items {
        f(w, item);
    }
}
