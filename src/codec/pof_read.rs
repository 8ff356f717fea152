//! Target-engine container reader: tag-dispatched chunk loop over the whole
//! stream. Chunk order on disk is not guaranteed; submodels are collected by
//! id and assembled once the stream ends.

use glam::Mat3;
use num_traits::FromPrimitive;

use crate::binary::{flip_bbox, flip_x, Reader};
use crate::error::{PofError, Result};
use crate::model::*;
use crate::tree::unpack_submodel;

use super::chunks::*;

pub fn read_pof(bytes: &[u8]) -> Result<ModelDocument> {
    let mut r = Reader::new(bytes);
    let sig = r.read_array::<4>()?;
    if sig != POF_SIGNATURE {
        return Err(PofError::Signature { found: sig });
    }
    let version = r.read_i32()?;
    if !(POF_MIN_VERSION..=POF_LATEST_VERSION).contains(&version) {
        return Err(PofError::UnsupportedVersion(version));
    }

    let mut doc = ModelDocument::new();
    let mut declared_subs: Option<usize> = None;
    let mut subs: Vec<(u32, SubModel, Vec<u8>)> = Vec::new();
    let mut caches_clean = false;

    while !r.is_empty() {
        let id = r.read_array::<4>()?;
        let len = r.read_i32()?;
        if len < 0 {
            return Err(PofError::Malformed { what: "negative chunk length", at: r.pos() });
        }
        let end = r.pos() + len as usize;
        if end > bytes.len() {
            return Err(PofError::Malformed { what: "chunk length past end of file", at: r.pos() });
        }

        match &id {
            id if *id == CHUNK_HEADER => {
                declared_subs = Some(read_header(&mut r, &mut doc)?);
            }
            id if *id == CHUNK_SUBMODEL => {
                subs.push(read_submodel(&mut r)?);
            }
            id if *id == CHUNK_TEXTURES => {
                doc.textures = read_list(&mut r, |r| r.read_string())?;
            }
            id if *id == CHUNK_SPECIALS => {
                doc.specials = read_list(&mut r, |r| {
                    Ok(SpecialPoint {
                        name: r.read_string()?,
                        properties: r.read_string()?,
                        position: flip_x(r.read_vec3()?),
                        radius: r.read_f32()?,
                    })
                })?;
            }
            id if *id == CHUNK_EYES => {
                doc.eyes = read_list(&mut r, |r| {
                    Ok(EyePoint {
                        submodel: r.read_i32()?,
                        offset: flip_x(r.read_vec3()?),
                        normal: flip_x(r.read_vec3()?),
                    })
                })?;
            }
            id if *id == CHUNK_PRIMARY_POINTS || *id == CHUNK_SECONDARY_POINTS => {
                let banks = read_list(&mut r, |r| {
                    Ok(WeaponBank {
                        points: read_list(r, |r| {
                            Ok(WeaponPoint {
                                position: flip_x(r.read_vec3()?),
                                normal: flip_x(r.read_vec3()?),
                            })
                        })?,
                    })
                })?;
                if *id == CHUNK_PRIMARY_POINTS {
                    doc.primary_banks = banks;
                } else {
                    doc.secondary_banks = banks;
                }
            }
            id if *id == CHUNK_GUN_TURRETS || *id == CHUNK_MISSILE_TURRETS => {
                let kind = if *id == CHUNK_GUN_TURRETS { TurretKind::Gun } else { TurretKind::Missile };
                let turrets = read_list(&mut r, |r| {
                    Ok(Turret {
                        kind,
                        parent: r.read_i32()?,
                        physical_parent: r.read_i32()?,
                        normal: flip_x(r.read_vec3()?),
                        fire_points: read_list(r, |r| Ok(flip_x(r.read_vec3()?)))?,
                    })
                })?;
                doc.turrets.extend(turrets);
            }
            id if *id == CHUNK_DOCKS => {
                doc.docks = read_list(&mut r, |r| {
                    Ok(Dock {
                        properties: r.read_string()?,
                        paths: read_list(r, |r| r.read_i32())?,
                        points: read_list(r, |r| {
                            Ok(DockPoint {
                                position: flip_x(r.read_vec3()?),
                                normal: flip_x(r.read_vec3()?),
                            })
                        })?,
                    })
                })?;
            }
            id if *id == CHUNK_THRUSTERS => {
                doc.thrusters = read_list(&mut r, |r| {
                    let count = r.read_i32()?;
                    if count < 0 {
                        return Err(PofError::Malformed { what: "negative thruster glow count", at: r.pos() });
                    }
                    let properties = if version >= POF_FUEL_PROPERTIES_VERSION {
                        r.read_string()?
                    } else {
                        String::new()
                    };
                    let mut glows = Vec::new();
                    for _ in 0..count {
                        glows.push(ThrusterGlow {
                            position: flip_x(r.read_vec3()?),
                            normal: flip_x(r.read_vec3()?),
                            radius: r.read_f32()?,
                        });
                    }
                    Ok(ThrusterBank { properties, glows })
                })?;
            }
            id if *id == CHUNK_GLOWS => {
                doc.glow_banks = read_list(&mut r, |r| {
                    let disp_time = r.read_i32()?;
                    let on_time = r.read_u32()?;
                    let off_time = r.read_u32()?;
                    let parent = r.read_i32()?;
                    let lod = r.read_u32()?;
                    let kind = r.read_u32()?;
                    let count = r.read_u32()?;
                    let properties = r.read_string()?;
                    let mut points = Vec::new();
                    for _ in 0..count {
                        points.push(GlowPoint {
                            position: flip_x(r.read_vec3()?),
                            normal: flip_x(r.read_vec3()?),
                            radius: r.read_f32()?,
                        });
                    }
                    Ok(GlowBank { disp_time, on_time, off_time, parent, lod, kind, properties, points })
                })?;
            }
            id if *id == CHUNK_SHIELD => {
                doc.shield.verts = read_list(&mut r, |r| Ok(flip_x(r.read_vec3()?)))?;
                doc.shield.faces = read_list(&mut r, |r| {
                    Ok(ShieldFace {
                        normal: flip_x(r.read_vec3()?),
                        verts: [r.read_u32()?, r.read_u32()?, r.read_u32()?],
                        neighbors: [r.read_i32()?, r.read_i32()?, r.read_i32()?],
                    })
                })?;
            }
            id if *id == CHUNK_SHIELD_TREE => {
                // Recomputed from the shield mesh on save; nothing to keep.
                log::debug!("skipping {} bytes of precompiled collision tree", len);
            }
            id if *id == CHUNK_AUTO_CENTER => {
                doc.auto_center = flip_x(r.read_vec3()?);
            }
            id if *id == CHUNK_INSIGNIA => {
                doc.insignias = read_list(&mut r, |r| {
                    let detail_level = r.read_i32()?;
                    let face_count = r.read_i32()?;
                    if face_count < 0 {
                        return Err(PofError::Malformed { what: "negative insignia face count", at: r.pos() });
                    }
                    let verts = read_list(r, |r| Ok(flip_x(r.read_vec3()?)))?;
                    let offset = flip_x(r.read_vec3()?);
                    let mut faces = Vec::new();
                    for _ in 0..face_count {
                        let mut face = [InsigniaVert::default(); 3];
                        for corner in &mut face {
                            *corner = InsigniaVert {
                                vert: r.read_u32()?,
                                u: r.read_f32()?,
                                v: r.read_f32()?,
                            };
                        }
                        faces.push(face);
                    }
                    Ok(Insignia { detail_level, offset, verts, faces })
                })?;
            }
            id if *id == CHUNK_PATHS => {
                doc.paths = read_list(&mut r, |r| {
                    Ok(AiPath {
                        name: r.read_string()?,
                        parent: r.read_string()?,
                        points: read_list(r, |r| {
                            Ok(PathPoint {
                                position: flip_x(r.read_vec3()?),
                                radius: r.read_f32()?,
                                turrets: read_list(r, |r| r.read_i32())?,
                            })
                        })?,
                    })
                })?;
            }
            id if *id == CHUNK_INFO => {
                // The whole payload is NUL-separated strings; the cache
                // marker is codec metadata, not document data.
                let raw = r.read_bytes(len as usize)?;
                for piece in raw.split(|&b| b == 0).filter(|p| !p.is_empty()) {
                    let s = String::from_utf8_lossy(piece).into_owned();
                    if s == CACHE_MARKER {
                        caches_clean = true;
                    } else {
                        doc.pof_info.push(s);
                    }
                }
            }
            _ => {
                log::warn!("skipping unknown chunk {:?} ({len} bytes)", String::from_utf8_lossy(&id));
            }
        }
        r.seek(end)?;
    }

    assemble_submodels(&mut doc, declared_subs, subs, caches_clean)?;
    super::validate_references(&doc)?;
    Ok(doc)
}

fn read_header(r: &mut Reader<'_>, doc: &mut ModelDocument) -> Result<usize> {
    let header = &mut doc.header;
    header.radius = r.read_f32()?;
    header.flags = r.read_u32()?;
    let sub_count = r.read_u32()? as usize;
    header.bbox = flip_bbox(r.read_bbox()?);
    header.detail_levels = read_list(r, |r| r.read_i32())?;
    header.debris = read_list(r, |r| r.read_i32())?;
    header.mass = r.read_f32()?;
    header.mass_center = flip_x(r.read_vec3()?);
    // Stored as three row vectors.
    let rows = [r.read_vec3()?, r.read_vec3()?, r.read_vec3()?];
    header.moi = Mat3::from_cols(rows[0], rows[1], rows[2]).transpose();

    let cross_count = match r.read_u32()? {
        u32::MAX => 0,
        n => n,
    };
    header.cross_sections = (0..cross_count)
        .map(|_| Ok(CrossSection { depth: r.read_f32()?, radius: r.read_f32()? }))
        .collect::<Result<_>>()?;

    // Legacy muzzle/thruster light list: obsolete, dropped on read.
    let light_count = r.read_i32()?;
    for _ in 0..light_count {
        r.read_vec3()?;
        r.read_u32()?;
    }
    if light_count > 0 {
        log::debug!("dropped {light_count} legacy header lights");
    }
    Ok(sub_count)
}

fn read_submodel(r: &mut Reader<'_>) -> Result<(u32, SubModel, Vec<u8>)> {
    let obj_id = r.read_u32()?;
    let mut sub = SubModel {
        radius: r.read_f32()?,
        parent: r.read_i32()?,
        offset: flip_x(r.read_vec3()?),
        geo_center: flip_x(r.read_vec3()?),
        ..Default::default()
    };
    sub.bbox = flip_bbox(r.read_bbox()?);
    sub.name = r.read_string()?;
    sub.properties = r.read_string()?;
    sub.movement_type = MovementType::from_i32(r.read_i32()?).unwrap_or_default();
    sub.movement_axis = MovementAxis::from_i32(r.read_i32()?).unwrap_or_default();
    if sub.movement_type == MovementType::None {
        sub.movement_axis = MovementAxis::None;
    }

    if r.read_i32()? != 0 {
        return Err(PofError::Malformed { what: "reserved submodel field is nonzero", at: r.pos() });
    }
    let data_len = r.read_i32()?;
    if data_len < 0 {
        return Err(PofError::Malformed { what: "negative geometry buffer length", at: r.pos() });
    }
    let data = r.read_bytes(data_len as usize)?.to_vec();
    sub.polygons = unpack_submodel(&data)?;
    Ok((obj_id, sub, data))
}

fn assemble_submodels(
    doc: &mut ModelDocument,
    declared: Option<usize>,
    mut subs: Vec<(u32, SubModel, Vec<u8>)>,
    caches_clean: bool,
) -> Result<()> {
    let declared = declared.ok_or(PofError::Malformed { what: "file has no header chunk", at: 0 })?;
    if subs.len() != declared {
        return Err(PofError::Malformed { what: "submodel count does not match header", at: 0 });
    }
    subs.sort_by_key(|&(id, _, _)| id);
    for (slot, &(id, _, _)) in subs.iter().enumerate() {
        if id as usize != slot {
            return Err(PofError::Malformed { what: "submodel ids are not contiguous", at: 0 });
        }
    }
    for (_, sub, data) in subs {
        doc.submodels.push(sub);
        doc.render_cache.push(RenderCache { data, changed: !caches_clean });
    }
    Ok(())
}

fn read_list<T>(r: &mut Reader<'_>, mut f: impl FnMut(&mut Reader<'_>) -> Result<T>) -> Result<Vec<T>> {
    let count = r.read_i32()?;
    if count < 0 {
        return Err(PofError::Malformed { what: "negative list length", at: r.pos() });
    }
    (0..count).map(|_| f(r)).collect()
}
