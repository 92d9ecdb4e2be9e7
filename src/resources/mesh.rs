use std::io::{BufReader, Cursor};

use anyhow::{Context, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::level::{Buffer, Primitive};

/// Flat vertex streams of one mesh, ready to become level buffers.
///
/// Every vertex has a position, a normal and a texture coordinate; missing
/// normals and texture coordinates are zero filled on import.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub texcoords: Vec<f32>,
    pub indices: Vec<u32>,
    pub primitive: Primitive,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Unit quad in the XY plane facing +Z.
    pub fn quad() -> Self {
        Self {
            positions: vec![
                -1.0, -1.0, 0.0, //
                1.0, -1.0, 0.0, //
                1.0, 1.0, 0.0, //
                -1.0, 1.0, 0.0,
            ],
            normals: [0.0, 0.0, 1.0].repeat(4),
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            indices: vec![0, 1, 2, 0, 2, 3],
            primitive: Primitive::Triangles,
        }
    }

    /// Cube spanning -1..1 on every axis, four vertices per face.
    pub fn cube() -> Self {
        // Outward normal, then the two in-plane axes (u, v) with u x v = normal.
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let corners = [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        let mut mesh = Self::default();
        for (face, (normal, u, v)) in faces.iter().enumerate() {
            for (cu, cv) in corners {
                for axis in 0..3 {
                    mesh.positions.push(normal[axis] + cu * u[axis] + cv * v[axis]);
                }
                mesh.normals.extend_from_slice(normal);
                mesh.texcoords.extend_from_slice(&[(cu + 1.0) / 2.0, (cv + 1.0) / 2.0]);
            }
            let base = face as u32 * 4;
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Validates stream lengths and index ranges.
    pub fn check(&self) -> Result<(), String> {
        if self.positions.len() % 3 != 0 {
            return Err(format!("{} position floats is not a multiple of 3", self.positions.len()));
        }
        let vertices = self.vertex_count();
        if self.normals.len() != vertices * 3 {
            return Err(format!("{} normal floats for {} vertices", self.normals.len(), vertices));
        }
        if self.texcoords.len() != vertices * 2 {
            return Err(format!(
                "{} texture coordinate floats for {} vertices",
                self.texcoords.len(),
                vertices
            ));
        }
        if self.primitive == Primitive::Triangles && self.indices.len() % 3 != 0 {
            return Err(format!("{} indices is not a whole number of triangles", self.indices.len()));
        }
        if let Some(index) = self.indices.iter().find(|i| **i as usize >= vertices) {
            return Err(format!("index {} out of range for {} vertices", index, vertices));
        }
        Ok(())
    }

    /// Point, normal, texcoord and index buffers named after `name`.
    pub fn to_buffers(&self, name: &str) -> [Buffer; 4] {
        [
            Buffer::vertex(&format!("{}.point", name), self.positions.clone()),
            Buffer::vertex(&format!("{}.normal", name), self.normals.clone()),
            Buffer::vertex(&format!("{}.texcoord", name), self.texcoords.clone()),
            Buffer::index(&format!("{}.index", name), self.indices.clone()),
        ]
    }
}

/// Parses an OBJ file. All objects in the file are merged into one mesh.
///
/// Texture coordinates are kept as authored. Material libraries are ignored;
/// materials come from the level description.
pub fn parse_obj(text: &str, file_name: &str) -> anyhow::Result<MeshData> {
    let mut obj_reader = BufReader::new(Cursor::new(text));
    let (models, _) = tobj::load_obj_buf(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Err(tobj::LoadError::OpenFileFailed),
    )
    .with_context(|| format!("could not parse OBJ {}", file_name))?;

    let mut mesh = MeshData::default();
    for m in &models {
        let base = mesh.vertex_count() as u32;
        let count = m.mesh.positions.len() / 3;
        mesh.positions.extend_from_slice(&m.mesh.positions[..count * 3]);
        for i in 0..count {
            mesh.normals.extend_from_slice(&[
                m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
            ]);
            mesh.texcoords.extend_from_slice(&[
                m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ]);
        }
        mesh.indices.extend(m.mesh.indices.iter().map(|i| base + i));
    }
    if mesh.indices.is_empty() {
        log::warn!("OBJ {} contains no faces", file_name);
    }
    mesh.check()
        .map_err(|reason| anyhow::anyhow!("OBJ {}: {}", file_name, reason))?;
    Ok(mesh)
}

/// Parses an ASCII PLY file.
///
/// Vertices need `x`, `y`, `z`; `nx`/`ny`/`nz` and `s`/`t` (or `u`/`v`) are
/// picked up when present. Files without faces become point clouds, polygon
/// faces are fanned into triangles.
pub fn parse_ply(text: &str, file_name: &str) -> anyhow::Result<MeshData> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some("ply") {
        bail!("{} is not a PLY file", file_name);
    }

    let mut vertex_count = 0usize;
    let mut face_count = 0usize;
    let mut vertex_properties: Vec<String> = Vec::new();
    let mut current_element = String::new();
    for line in lines.by_ref() {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["format", "ascii", _] => (),
            ["format", format, _] => bail!("{}: unsupported PLY format {}", file_name, format),
            ["comment", ..] | ["obj_info", ..] => (),
            ["element", element, count] => {
                let count: usize = count
                    .parse()
                    .with_context(|| format!("{}: bad element count in \"{}\"", file_name, line))?;
                match *element {
                    "vertex" => vertex_count = count,
                    "face" => face_count = count,
                    other => bail!("{}: unsupported PLY element {}", file_name, other),
                }
                current_element = element.to_string();
            }
            ["property", "list", ..] => (),
            ["property", _, property] if current_element == "vertex" => {
                vertex_properties.push(property.to_string())
            }
            ["property", ..] => (),
            ["end_header"] => break,
            _ => bail!("{}: unexpected PLY header line \"{}\"", file_name, line),
        }
    }

    let column = |names: &[&str]| vertex_properties.iter().position(|p| names.contains(&p.as_str()));
    let (Some(x), Some(y), Some(z)) = (column(&["x"]), column(&["y"]), column(&["z"])) else {
        bail!("{}: PLY vertices need x, y and z", file_name);
    };
    let normal = (column(&["nx"]), column(&["ny"]), column(&["nz"]));
    let texcoord = (column(&["s", "u", "texture_u"]), column(&["t", "v", "texture_v"]));

    let mut mesh = MeshData::default();
    for _ in 0..vertex_count {
        let line = lines
            .next()
            .with_context(|| format!("{}: PLY file ends inside the vertex list", file_name))?;
        let values = line
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("{}: bad vertex \"{}\"", file_name, line))?;
        let value = |index: Option<usize>| index.and_then(|i| values.get(i)).copied().unwrap_or(0.0);
        mesh.positions
            .extend_from_slice(&[value(Some(x)), value(Some(y)), value(Some(z))]);
        mesh.normals
            .extend_from_slice(&[value(normal.0), value(normal.1), value(normal.2)]);
        mesh.texcoords
            .extend_from_slice(&[value(texcoord.0), value(texcoord.1)]);
    }

    if face_count == 0 {
        mesh.primitive = Primitive::Points;
        mesh.indices = (0..vertex_count as u32).collect();
    } else {
        for _ in 0..face_count {
            let line = lines
                .next()
                .with_context(|| format!("{}: PLY file ends inside the face list", file_name))?;
            let values = line
                .split_whitespace()
                .map(str::parse::<u32>)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("{}: bad face \"{}\"", file_name, line))?;
            let Some((&count, corners)) = values.split_first() else {
                bail!("{}: empty face line", file_name);
            };
            ensure!(
                corners.len() >= count as usize,
                "{}: face \"{}\" lists {} of {} indices",
                file_name,
                line,
                corners.len(),
                count
            );
            // Anything after the indices is a per-face property.
            let corners = &corners[..count as usize];
            for i in 1..corners.len().saturating_sub(1) {
                mesh.indices
                    .extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
            }
        }
    }
    mesh.check()
        .map_err(|reason| anyhow::anyhow!("PLY {}: {}", file_name, reason))?;
    Ok(mesh)
}
