//! Wavefront OBJ loading for collision meshes

use crate::error::{SimError, SimResult};
use nalgebra::Point3;
use std::path::Path;

/// Triangle soup with all models of a file merged together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f32>>,
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }
}

/// Load a mesh file, applying a per-axis scale to every vertex
pub fn load_mesh(path: &Path, scale: [f32; 3]) -> SimResult<TriangleMesh> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
        Some(ext) if ext == "obj" => load_obj(path, scale),
        other => Err(SimError::description(format!(
            "unsupported mesh format '{}' for '{}'",
            other.unwrap_or_default(),
            path.display()
        ))),
    }
}

pub fn load_obj(path: &Path, scale: [f32; 3]) -> SimResult<TriangleMesh> {
    tracing::debug!("Loading OBJ file: {}", path.display());

    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        },
    )
    .map_err(|e| SimError::description(format!("OBJ parsing error in '{}': {}", path.display(), e)))?;

    let mut mesh = TriangleMesh::default();
    for model in &models {
        let offset = mesh.vertices.len() as u32;
        mesh.vertices.extend(
            model
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| Point3::new(p[0] * scale[0], p[1] * scale[1], p[2] * scale[2])),
        );
        mesh.indices.extend(
            model
                .mesh
                .indices
                .chunks_exact(3)
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }

    if mesh.is_empty() {
        return Err(SimError::description(format!(
            "OBJ file '{}' contains no triangles",
            path.display()
        )));
    }

    tracing::debug!(
        "OBJ file '{}': {} models, {} vertices, {} triangles",
        path.display(),
        models.len(),
        mesh.vertices.len(),
        mesh.triangle_count()
    );
    Ok(mesh)
}
