//! OBJ model importer
//!
//! Faces are grouped into one mesh per object/group and material pair.
//! Polygons are fan triangulated.

use std::io::{BufRead, BufReader, Read};

use thiserror::Error;

use crate::backend::Vertex;

/// OBJ parse failure
#[derive(Error, Debug)]
pub enum ObjError {
    /// Reading the source failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A number or index could not be parsed
    #[error("Parse error on line {line}: {reason}")]
    ParseError {
        /// One based line number
        line: usize,
        /// What went wrong
        reason: String,
    },
    /// The file parsed but holds nothing usable
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// One mesh of an imported model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    /// Object or group name
    pub name: String,
    /// Material name from `usemtl`, empty when none
    pub material: String,
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl ImportedMesh {
    /// Triangles as position triples
    pub fn triangles(&self) -> impl Iterator<Item = [[f32; 3]; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.vertices[tri[0] as usize].position,
                self.vertices[tri[1] as usize].position,
                self.vertices[tri[2] as usize].position,
            ]
        })
    }
}

/// Turns model file bytes into meshes
pub trait ModelImporter: Send + Sync {
    /// Import every mesh in the source
    fn import(&self, source: &mut dyn Read) -> Result<Vec<ImportedMesh>, ObjError>;
}

/// Wavefront OBJ importer
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjLoader;

impl ModelImporter for ObjLoader {
    fn import(&self, source: &mut dyn Read) -> Result<Vec<ImportedMesh>, ObjError> {
        Self::parse(BufReader::new(source))
    }
}

fn parse_floats<const N: usize>(parts: &[&str], line: usize, what: &str) -> Result<[f32; N], ObjError> {
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| ObjError::ParseError {
            line,
            reason: format!("invalid {what} component '{part}'"),
        })?;
    }
    Ok(out)
}

/// Resolve a one based, possibly negative, OBJ index
fn resolve_index(raw: &str, count: usize, line: usize) -> Result<usize, ObjError> {
    let index: i64 = raw.parse().map_err(|_| ObjError::ParseError {
        line,
        reason: format!("invalid index '{raw}'"),
    })?;
    let resolved = if index < 0 { count as i64 + index } else { index - 1 };
    usize::try_from(resolved)
        .ok()
        .filter(|&i| i < count)
        .ok_or_else(|| ObjError::ParseError {
            line,
            reason: format!("index {index} out of bounds"),
        })
}

impl ObjLoader {
    /// Parse OBJ text
    pub fn parse<R: BufRead>(reader: R) -> Result<Vec<ImportedMesh>, ObjError> {
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut normals: Vec<[f32; 3]> = Vec::new();
        let mut tex_coords: Vec<[f32; 2]> = Vec::new();

        let mut meshes: Vec<ImportedMesh> = Vec::new();
        let mut current = ImportedMesh::default();

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let number = number + 1;
            let parts: Vec<&str> = line.split_whitespace().collect();
            let Some((&command, args)) = parts.split_first() else { continue };

            match command {
                "v" if args.len() >= 3 => positions.push(parse_floats(args, number, "vertex")?),
                "vn" if args.len() >= 3 => normals.push(parse_floats(args, number, "normal")?),
                "vt" if args.len() >= 2 => tex_coords.push(parse_floats(args, number, "tex coord")?),
                "o" | "g" => {
                    let name = args.join(" ");
                    let material = current.material.clone();
                    let finished = std::mem::replace(
                        &mut current,
                        ImportedMesh { name, material, ..ImportedMesh::default() },
                    );
                    if !finished.indices.is_empty() {
                        meshes.push(finished);
                    }
                }
                "usemtl" => {
                    let material = args.join(" ");
                    if current.indices.is_empty() {
                        current.material = material;
                    } else {
                        let name = current.name.clone();
                        meshes.push(std::mem::replace(
                            &mut current,
                            ImportedMesh { name, material, ..ImportedMesh::default() },
                        ));
                    }
                }
                "f" if args.len() >= 3 => {
                    let mut face = Vec::with_capacity(args.len());
                    for corner in args {
                        let mut refs = corner.split('/');
                        let position = resolve_index(refs.next().unwrap_or_default(), positions.len(), number)?;
                        let tex_coord = match refs.next() {
                            Some(raw) if !raw.is_empty() => tex_coords[resolve_index(raw, tex_coords.len(), number)?],
                            _ => [0.0, 0.0],
                        };
                        let normal = match refs.next() {
                            Some(raw) if !raw.is_empty() => normals[resolve_index(raw, normals.len(), number)?],
                            _ => [0.0, 1.0, 0.0],
                        };
                        current.vertices.push(Vertex {
                            position: positions[position],
                            normal,
                            tex_coord,
                        });
                        face.push((current.vertices.len() - 1) as u32);
                    }
                    for i in 1..face.len() - 1 {
                        current.indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if !current.indices.is_empty() {
            meshes.push(current);
        }
        if meshes.is_empty() {
            return Err(ObjError::InvalidFormat("No faces found in OBJ data".to_string()));
        }
        Ok(meshes)
    }
}
