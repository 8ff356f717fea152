//! Native intermediate format: fixed signature + version, then a strict
//! untagged field sequence in the in-memory coordinate convention (no X
//! negation). Versions: 100 base, 101 adds the auto-center offset and info
//! strings, 102 adds the per-submodel render-tree cache sections. Optional
//! sections absent in older files default rather than erroring.

use glam::Mat3;
use num_traits::FromPrimitive;

use crate::binary::{Reader, Writer};
use crate::error::{PofError, Result};
use crate::model::*;

use super::chunks::*;

pub fn write_native(doc: &ModelDocument) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_bytes(&PMF_SIGNATURE);
    w.write_i32(PMF_LATEST_VERSION);

    write_header(&mut w, &doc.header);
    write_list(&mut w, &doc.textures, |w, t| w.write_string(t));
    write_list(&mut w, &doc.submodels, write_submodel);

    write_list(&mut w, &doc.eyes, |w, eye| {
        w.write_i32(eye.submodel);
        w.write_vec3(eye.offset);
        w.write_vec3(eye.normal);
    });
    write_list(&mut w, &doc.specials, |w, sp| {
        w.write_string(&sp.name);
        w.write_string(&sp.properties);
        w.write_vec3(sp.position);
        w.write_f32(sp.radius);
    });
    for banks in [&doc.primary_banks, &doc.secondary_banks] {
        write_list(&mut w, banks, |w, bank| {
            write_list(w, &bank.points, |w, p| {
                w.write_vec3(p.position);
                w.write_vec3(p.normal);
            });
        });
    }
    write_list(&mut w, &doc.turrets, |w, t| {
        w.write_u8(match t.kind {
            TurretKind::Gun => 0,
            TurretKind::Missile => 1,
        });
        w.write_i32(t.parent);
        w.write_i32(t.physical_parent);
        w.write_vec3(t.normal);
        write_list(w, &t.fire_points, |w, &p| w.write_vec3(p));
    });
    write_list(&mut w, &doc.docks, |w, dock| {
        w.write_string(&dock.properties);
        write_list(w, &dock.paths, |w, &p| w.write_i32(p));
        write_list(w, &dock.points, |w, p| {
            w.write_vec3(p.position);
            w.write_vec3(p.normal);
        });
    });
    write_list(&mut w, &doc.thrusters, |w, bank| {
        w.write_string(&bank.properties);
        write_list(w, &bank.glows, |w, glow| {
            w.write_vec3(glow.position);
            w.write_vec3(glow.normal);
            w.write_f32(glow.radius);
        });
    });
    write_list(&mut w, &doc.shield.verts, |w, &v| w.write_vec3(v));
    write_list(&mut w, &doc.shield.faces, |w, face| {
        w.write_vec3(face.normal);
        for &v in &face.verts {
            w.write_u32(v);
        }
        for &n in &face.neighbors {
            w.write_i32(n);
        }
    });
    write_list(&mut w, &doc.insignias, |w, insignia| {
        w.write_i32(insignia.detail_level);
        w.write_vec3(insignia.offset);
        write_list(w, &insignia.verts, |w, &v| w.write_vec3(v));
        write_list(w, &insignia.faces, |w, face| {
            for corner in face {
                w.write_u32(corner.vert);
                w.write_f32(corner.u);
                w.write_f32(corner.v);
            }
        });
    });
    write_list(&mut w, &doc.paths, |w, path| {
        w.write_string(&path.name);
        w.write_string(&path.parent);
        write_list(w, &path.points, |w, point| {
            w.write_vec3(point.position);
            w.write_f32(point.radius);
            write_list(w, &point.turrets, |w, &t| w.write_i32(t));
        });
    });
    write_list(&mut w, &doc.glow_banks, |w, bank| {
        w.write_i32(bank.disp_time);
        w.write_u32(bank.on_time);
        w.write_u32(bank.off_time);
        w.write_i32(bank.parent);
        w.write_u32(bank.lod);
        w.write_u32(bank.kind);
        w.write_string(&bank.properties);
        write_list(w, &bank.points, |w, point| {
            w.write_vec3(point.position);
            w.write_vec3(point.normal);
            w.write_f32(point.radius);
        });
    });

    // v101
    w.write_vec3(doc.auto_center);
    write_list(&mut w, &doc.pof_info, |w, line| w.write_string(line));

    // v102
    for cache in &doc.render_cache {
        w.write_u8(cache.changed as u8);
        w.write_i32(cache.data.len() as i32);
        w.write_bytes(&cache.data);
    }

    w.into_bytes()
}

fn write_header(w: &mut Writer, header: &ModelHeader) {
    w.write_f32(header.mass);
    w.write_vec3(header.mass_center);
    let moi = header.moi.transpose();
    w.write_vec3(moi.x_axis);
    w.write_vec3(moi.y_axis);
    w.write_vec3(moi.z_axis);
    w.write_f32(header.radius);
    write_option(w, header.radius_override, Writer::write_f32);
    w.write_bbox(header.bbox);
    write_option(w, header.bbox_override, Writer::write_bbox);
    write_list(w, &header.detail_levels, |w, &i| w.write_i32(i));
    write_list(w, &header.debris, |w, &i| w.write_i32(i));
    write_list(w, &header.cross_sections, |w, cs| {
        w.write_f32(cs.depth);
        w.write_f32(cs.radius);
    });
    w.write_u32(header.flags);
}

fn write_submodel(w: &mut Writer, sub: &SubModel) {
    w.write_i32(sub.parent);
    w.write_vec3(sub.offset);
    w.write_vec3(sub.geo_center);
    w.write_f32(sub.radius);
    write_option(w, sub.radius_override, Writer::write_f32);
    w.write_bbox(sub.bbox);
    write_option(w, sub.bbox_override, Writer::write_bbox);
    w.write_string(&sub.name);
    w.write_string(&sub.properties);
    w.write_i32(sub.movement_type as i32);
    w.write_i32(sub.movement_axis as i32);
    write_list(w, &sub.polygons, |w, poly| {
        w.write_i32(poly.texture);
        w.write_bytes(&poly.color);
        w.write_vec3(poly.normal);
        write_list(w, &poly.verts, |w, vert| {
            w.write_vec3(vert.position);
            w.write_vec3(vert.normal);
            w.write_vec2(vert.uv);
        });
    });
}

pub fn read_native(bytes: &[u8]) -> Result<ModelDocument> {
    let mut r = Reader::new(bytes);
    let sig = r.read_array::<4>()?;
    if sig != PMF_SIGNATURE {
        return Err(PofError::Signature { found: sig });
    }
    let version = r.read_i32()?;
    if !(PMF_MIN_VERSION..=PMF_LATEST_VERSION).contains(&version) {
        return Err(PofError::UnsupportedVersion(version));
    }

    let mut doc = ModelDocument::new();
    read_header(&mut r, &mut doc.header)?;
    doc.textures = read_list(&mut r, |r| r.read_string())?;
    doc.submodels = read_list(&mut r, read_submodel)?;

    doc.eyes = read_list(&mut r, |r| {
        Ok(EyePoint { submodel: r.read_i32()?, offset: r.read_vec3()?, normal: r.read_vec3()? })
    })?;
    doc.specials = read_list(&mut r, |r| {
        Ok(SpecialPoint {
            name: r.read_string()?,
            properties: r.read_string()?,
            position: r.read_vec3()?,
            radius: r.read_f32()?,
        })
    })?;
    doc.primary_banks = read_banks(&mut r)?;
    doc.secondary_banks = read_banks(&mut r)?;
    doc.turrets = read_list(&mut r, |r| {
        let kind = match r.read_u8()? {
            0 => TurretKind::Gun,
            1 => TurretKind::Missile,
            _ => return Err(PofError::Malformed { what: "unknown turret kind", at: r.pos() }),
        };
        Ok(Turret {
            kind,
            parent: r.read_i32()?,
            physical_parent: r.read_i32()?,
            normal: r.read_vec3()?,
            fire_points: read_list(r, |r| r.read_vec3())?,
        })
    })?;
    doc.docks = read_list(&mut r, |r| {
        Ok(Dock {
            properties: r.read_string()?,
            paths: read_list(r, |r| r.read_i32())?,
            points: read_list(r, |r| {
                Ok(DockPoint { position: r.read_vec3()?, normal: r.read_vec3()? })
            })?,
        })
    })?;
    doc.thrusters = read_list(&mut r, |r| {
        Ok(ThrusterBank {
            properties: r.read_string()?,
            glows: read_list(r, |r| {
                Ok(ThrusterGlow {
                    position: r.read_vec3()?,
                    normal: r.read_vec3()?,
                    radius: r.read_f32()?,
                })
            })?,
        })
    })?;
    doc.shield.verts = read_list(&mut r, |r| r.read_vec3())?;
    doc.shield.faces = read_list(&mut r, |r| {
        Ok(ShieldFace {
            normal: r.read_vec3()?,
            verts: [r.read_u32()?, r.read_u32()?, r.read_u32()?],
            neighbors: [r.read_i32()?, r.read_i32()?, r.read_i32()?],
        })
    })?;
    doc.insignias = read_list(&mut r, |r| {
        Ok(Insignia {
            detail_level: r.read_i32()?,
            offset: r.read_vec3()?,
            verts: read_list(r, |r| r.read_vec3())?,
            faces: read_list(r, |r| {
                let mut face = [InsigniaVert::default(); 3];
                for corner in &mut face {
                    *corner = InsigniaVert { vert: r.read_u32()?, u: r.read_f32()?, v: r.read_f32()? };
                }
                Ok(face)
            })?,
        })
    })?;
    doc.paths = read_list(&mut r, |r| {
        Ok(AiPath {
            name: r.read_string()?,
            parent: r.read_string()?,
            points: read_list(r, |r| {
                Ok(PathPoint {
                    position: r.read_vec3()?,
                    radius: r.read_f32()?,
                    turrets: read_list(r, |r| r.read_i32())?,
                })
            })?,
        })
    })?;
    doc.glow_banks = read_list(&mut r, |r| {
        Ok(GlowBank {
            disp_time: r.read_i32()?,
            on_time: r.read_u32()?,
            off_time: r.read_u32()?,
            parent: r.read_i32()?,
            lod: r.read_u32()?,
            kind: r.read_u32()?,
            properties: r.read_string()?,
            points: read_list(r, |r| {
                Ok(GlowPoint {
                    position: r.read_vec3()?,
                    normal: r.read_vec3()?,
                    radius: r.read_f32()?,
                })
            })?,
        })
    })?;

    if version >= PMF_AUTO_CENTER_VERSION {
        doc.auto_center = r.read_vec3()?;
        doc.pof_info = read_list(&mut r, |r| r.read_string())?;
    }

    doc.render_cache = if version >= PMF_CACHE_VERSION {
        (0..doc.submodels.len())
            .map(|_| {
                let changed = r.read_u8()? != 0;
                let len = r.read_i32()?;
                if len < 0 {
                    return Err(PofError::Malformed { what: "negative cache length", at: r.pos() });
                }
                Ok(RenderCache { data: r.read_bytes(len as usize)?.to_vec(), changed })
            })
            .collect::<Result<_>>()?
    } else {
        // Older files carry no caches; everything recompiles on next save.
        doc.submodels.iter().map(|_| RenderCache { data: Vec::new(), changed: true }).collect()
    };

    super::validate_references(&doc)?;
    Ok(doc)
}

fn read_header(r: &mut Reader<'_>, header: &mut ModelHeader) -> Result<()> {
    header.mass = r.read_f32()?;
    header.mass_center = r.read_vec3()?;
    let rows = [r.read_vec3()?, r.read_vec3()?, r.read_vec3()?];
    header.moi = Mat3::from_cols(rows[0], rows[1], rows[2]).transpose();
    header.radius = r.read_f32()?;
    header.radius_override = read_option(r, |r| r.read_f32())?;
    header.bbox = r.read_bbox()?;
    header.bbox_override = read_option(r, |r| r.read_bbox())?;
    header.detail_levels = read_list(r, |r| r.read_i32())?;
    header.debris = read_list(r, |r| r.read_i32())?;
    header.cross_sections = read_list(r, |r| {
        Ok(CrossSection { depth: r.read_f32()?, radius: r.read_f32()? })
    })?;
    header.flags = r.read_u32()?;
    Ok(())
}

fn read_submodel(r: &mut Reader<'_>) -> Result<SubModel> {
    let mut sub = SubModel {
        parent: r.read_i32()?,
        offset: r.read_vec3()?,
        geo_center: r.read_vec3()?,
        radius: r.read_f32()?,
        ..Default::default()
    };
    sub.radius_override = read_option(r, |r| r.read_f32())?;
    sub.bbox = r.read_bbox()?;
    sub.bbox_override = read_option(r, |r| r.read_bbox())?;
    sub.name = r.read_string()?;
    sub.properties = r.read_string()?;
    sub.movement_type = MovementType::from_i32(r.read_i32()?).unwrap_or_default();
    sub.movement_axis = MovementAxis::from_i32(r.read_i32()?).unwrap_or_default();
    sub.polygons = read_list(r, |r| {
        let texture = r.read_i32()?;
        let color = r.read_array::<3>()?;
        let normal = r.read_vec3()?;
        let verts = read_list(r, |r| {
            Ok(PolyVertex { position: r.read_vec3()?, normal: r.read_vec3()?, uv: r.read_vec2()? })
        })?;
        let mut poly = Polygon::new(verts, texture);
        poly.color = color;
        poly.normal = normal;
        Ok(poly)
    })?;
    Ok(sub)
}

fn write_option<T: Copy>(w: &mut Writer, value: Option<T>, f: impl Fn(&mut Writer, T)) {
    match value {
        Some(v) => {
            w.write_u8(1);
            f(w, v);
        }
        None => w.write_u8(0),
    }
}

fn read_option<T>(r: &mut Reader<'_>, f: impl Fn(&mut Reader<'_>) -> Result<T>) -> Result<Option<T>> {
    match r.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(f(r)?)),
    }
}

fn write_list<T>(w: &mut Writer, items: &[T], f: impl Fn(&mut Writer, &T)) {
    w.write_i32(items.len() as i32);
    for item in items {
        f(w, item);
    }
}

fn read_list<T>(r: &mut Reader<'_>, mut f: impl FnMut(&mut Reader<'_>) -> Result<T>) -> Result<Vec<T>> {
    let count = r.read_i32()?;
    if count < 0 {
        return Err(PofError::Malformed { what: "negative list length", at: r.pos() });
    }
    (0..count).map(|_| f(r)).collect()
}

fn read_banks(r: &mut Reader<'_>) -> Result<Vec<WeaponBank>> {
    read_list(r, |r| {
        Ok(WeaponBank {
            points: read_list(r, |r| {
                Ok(WeaponPoint { position: r.read_vec3()?, normal: r.read_vec3()? })
            })?,
        })
    })
}
