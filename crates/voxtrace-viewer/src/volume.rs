//! Dense voxel volumes and the MagicaVoxel `.vox` reader.

use std::io;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use glam::UVec3;
use thiserror::Error;

pub const PALETTE_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not a .vox file")]
    BadMagic,

    #[error("truncated {chunk} chunk")]
    Truncated { chunk: String },

    #[error("missing {0} chunk")]
    MissingChunk(&'static str),

    #[error("invalid model size {0}")]
    InvalidSize(UVec3),

    #[error("voxel ({x}, {y}, {z}) lies outside the model")]
    VoxelOutOfBounds { x: u8, y: u8, z: u8 },
}

/// Dense grid of palette indices, x varying fastest, then y, then z.
///
/// Y is up. Index 0 marks an empty cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelVolume {
    size: UVec3,
    indices: Vec<u8>,
    palette: Vec<u32>,
}

impl VoxelVolume {
    /// Builds a volume from raw parts. `palette` is padded or cut to 256 entries.
    pub fn new(size: UVec3, indices: Vec<u8>, mut palette: Vec<u32>) -> Result<Self, VolumeError> {
        let cells = cell_count(size)?;
        if indices.len() != cells {
            return Err(VolumeError::InvalidSize(size));
        }
        palette.resize(PALETTE_LEN, 0);
        Ok(Self {
            size,
            indices,
            palette,
        })
    }

    pub fn from_vox_file(path: impl AsRef<Path>) -> Result<Self, VolumeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| VolumeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_vox_bytes(&bytes)
    }

    /// Parses the first model of a `.vox` container.
    ///
    /// MagicaVoxel is Z-up; the model is rotated so its Z axis becomes Y.
    pub fn from_vox_bytes(bytes: &[u8]) -> Result<Self, VolumeError> {
        let mut rest = bytes;
        let magic = take(&mut rest, 4, "header").map_err(|_| VolumeError::BadMagic)?;
        if magic != b"VOX " {
            return Err(VolumeError::BadMagic);
        }
        let _version = read_u32(&mut rest, "header")?;

        let main = read_chunk(&mut rest)?;
        if &main.id != b"MAIN" {
            return Err(VolumeError::MissingChunk("MAIN"));
        }

        let mut size = None;
        let mut voxels = None;
        let mut rgba = None;

        let mut children = main.children;
        while !children.is_empty() {
            let chunk = read_chunk(&mut children)?;
            match &chunk.id {
                b"SIZE" if size.is_none() => size = Some(parse_size(chunk.content)?),
                b"XYZI" if voxels.is_none() => voxels = Some(chunk.content),
                b"RGBA" => rgba = Some(parse_palette(chunk.content)?),
                _ => {}
            }
        }

        let vox_size = size.ok_or(VolumeError::MissingChunk("SIZE"))?;
        let voxels = voxels.ok_or(VolumeError::MissingChunk("XYZI"))?;

        // Z-up to Y-up.
        let grid = UVec3::new(vox_size.x, vox_size.z, vox_size.y);
        let mut indices = vec![0u8; cell_count(grid)?];

        let mut content = voxels;
        let count = read_u32(&mut content, "XYZI")? as usize;
        let data = take(&mut content, count.saturating_mul(4), "XYZI")?;

        for v in data.chunks_exact(4) {
            let (x, y, z, color) = (v[0], v[1], v[2], v[3]);
            if u32::from(x) >= vox_size.x || u32::from(y) >= vox_size.y || u32::from(z) >= vox_size.z {
                return Err(VolumeError::VoxelOutOfBounds { x, y, z });
            }
            let cell = UVec3::new(u32::from(x), u32::from(z), u32::from(y));
            indices[linear_index(grid, cell)] = color;
        }

        let palette = rgba.unwrap_or_else(fallback_palette);
        log::info!("loaded .vox model {}x{}x{} ({count} voxels)", grid.x, grid.y, grid.z);
        Self::new(grid, indices, palette)
    }

    /// Procedural scene used when no model is given: a floor, a ring of
    /// pillars and a sphere in the middle.
    pub fn demo() -> Self {
        let size = UVec3::new(64, 48, 64);
        let mut indices = vec![0u8; (size.x * size.y * size.z) as usize];
        let center = size.as_vec3() * glam::Vec3::new(0.5, 0.0, 0.5);

        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    let p = glam::Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
                    let flat = glam::Vec2::new(p.x - center.x, p.z - center.z);
                    let angle = flat.y.atan2(flat.x);

                    let index = if y < 2 {
                        // Checkered floor.
                        if (x / 8 + z / 8) % 2 == 0 { 8 } else { 16 }
                    } else if flat.length() > 22.0
                        && flat.length() < 26.0
                        && (angle * 4.0 / std::f32::consts::PI).fract().abs() < 0.25
                        && y < 30
                    {
                        // Pillars, colored by height.
                        (40 + y) as u8
                    } else if p.distance(glam::Vec3::new(center.x, 14.0, center.z)) < 11.0 {
                        200
                    } else {
                        0
                    };

                    indices[linear_index(size, UVec3::new(x, y, z))] = index;
                }
            }
        }

        Self {
            size,
            indices,
            palette: fallback_palette(),
        }
    }

    pub fn size(&self) -> UVec3 {
        self.size
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Palette as packed little-endian RGBA (`0xAABBGGRR`), 256 entries.
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    pub fn get(&self, cell: UVec3) -> Option<u8> {
        if cell.cmpge(self.size).any() {
            return None;
        }
        Some(self.indices[linear_index(self.size, cell)])
    }

    pub fn solid_count(&self) -> usize {
        self.indices.iter().filter(|&&i| i != 0).count()
    }

    /// Indices packed four per `u32` (first cell in the low byte), zero padded.
    ///
    /// Storage buffers have no byte addressing, so the shader unpacks these.
    pub fn packed_indices(&self) -> Vec<u32> {
        self.indices
            .chunks(4)
            .map(|c| {
                let mut word = [0u8; 4];
                word[..c.len()].copy_from_slice(c);
                u32::from_le_bytes(word)
            })
            .collect()
    }
}

struct Chunk<'a> {
    id: [u8; 4],
    content: &'a [u8],
    children: &'a [u8],
}

fn read_chunk<'a>(rest: &mut &'a [u8]) -> Result<Chunk<'a>, VolumeError> {
    let id_bytes = take(rest, 4, "chunk header")?;
    let id = [id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]];
    let name = String::from_utf8_lossy(&id).into_owned();

    let content_len = read_u32(rest, &name)? as usize;
    let children_len = read_u32(rest, &name)? as usize;
    let content = take(rest, content_len, &name)?;
    let children = take(rest, children_len, &name)?;

    Ok(Chunk {
        id,
        content,
        children,
    })
}

fn parse_size(mut content: &[u8]) -> Result<UVec3, VolumeError> {
    let x = read_u32(&mut content, "SIZE")?;
    let y = read_u32(&mut content, "SIZE")?;
    let z = read_u32(&mut content, "SIZE")?;
    let size = UVec3::new(x, y, z);
    cell_count(size)?;
    Ok(size)
}

/// `RGBA` entry `i` describes color index `i + 1`; index 0 stays empty.
fn parse_palette(content: &[u8]) -> Result<Vec<u32>, VolumeError> {
    let mut rest = content;
    let colors = take(&mut rest, PALETTE_LEN * 4, "RGBA")?;

    let mut palette = vec![0u32; PALETTE_LEN];
    for (i, c) in colors.chunks_exact(4).take(PALETTE_LEN - 1).enumerate() {
        palette[i + 1] = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    }
    Ok(palette)
}

/// Smooth hue ramp over indices 1..=255, fully opaque.
pub fn fallback_palette() -> Vec<u32> {
    let mut palette = vec![0u32; PALETTE_LEN];
    for (i, entry) in palette.iter_mut().enumerate().skip(1) {
        let t = i as f32 / 255.0;
        let hue = t * 6.0;
        let x = 1.0 - (hue % 2.0 - 1.0).abs();
        let (r, g, b) = match hue as u32 {
            0 => (1.0, x, 0.0),
            1 => (x, 1.0, 0.0),
            2 => (0.0, 1.0, x),
            3 => (0.0, x, 1.0),
            4 => (x, 0.0, 1.0),
            _ => (1.0, 0.0, x),
        };
        // Keep colors away from pure black and pure white.
        let shade = |c: f32| (40.0 + c * 200.0) as u8;
        *entry = u32::from_le_bytes([shade(r), shade(g), shade(b), 255]);
    }
    palette
}

fn cell_count(size: UVec3) -> Result<usize, VolumeError> {
    if size.cmpeq(UVec3::ZERO).any() {
        return Err(VolumeError::InvalidSize(size));
    }
    (size.x as usize)
        .checked_mul(size.y as usize)
        .and_then(|n| n.checked_mul(size.z as usize))
        .ok_or(VolumeError::InvalidSize(size))
}

fn linear_index(size: UVec3, cell: UVec3) -> usize {
    cell.x as usize + size.x as usize * (cell.y as usize + size.y as usize * cell.z as usize)
}

fn take<'a>(rest: &mut &'a [u8], n: usize, chunk: &str) -> Result<&'a [u8], VolumeError> {
    if rest.len() < n {
        return Err(VolumeError::Truncated {
            chunk: chunk.to_string(),
        });
    }
    let (head, tail) = rest.split_at(n);
    *rest = tail;
    Ok(head)
}

fn read_u32(rest: &mut &[u8], chunk: &str) -> Result<u32, VolumeError> {
    rest.read_u32::<LittleEndian>()
        .map_err(|_| VolumeError::Truncated {
            chunk: chunk.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn chunk(id: &[u8; 4], content: &[u8], children: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_all(id).unwrap();
        out.write_u32::<LittleEndian>(content.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(children.len() as u32).unwrap();
        out.write_all(content).unwrap();
        out.write_all(children).unwrap();
        out
    }

    fn vox(children: &[Vec<u8>]) -> Vec<u8> {
        let mut out = b"VOX ".to_vec();
        out.write_u32::<LittleEndian>(150).unwrap();
        out.extend(chunk(b"MAIN", &[], &children.concat()));
        out
    }

    fn size_chunk(x: u32, y: u32, z: u32) -> Vec<u8> {
        let mut c = Vec::new();
        for v in [x, y, z] {
            c.write_u32::<LittleEndian>(v).unwrap();
        }
        chunk(b"SIZE", &c, &[])
    }

    fn xyzi_chunk(voxels: &[[u8; 4]]) -> Vec<u8> {
        let mut c = Vec::new();
        c.write_u32::<LittleEndian>(voxels.len() as u32).unwrap();
        for v in voxels {
            c.write_all(v).unwrap();
        }
        chunk(b"XYZI", &c, &[])
    }

    #[test]
    fn parses_model_and_swaps_z_up_to_y_up() {
        let bytes = vox(&[size_chunk(2, 3, 4), xyzi_chunk(&[[1, 2, 3, 7], [0, 0, 0, 1]])]);
        let volume = VoxelVolume::from_vox_bytes(&bytes).unwrap();

        assert_eq!(volume.size(), UVec3::new(2, 4, 3));
        assert_eq!(volume.get(UVec3::new(1, 3, 2)), Some(7));
        assert_eq!(volume.get(UVec3::ZERO), Some(1));
        assert_eq!(volume.solid_count(), 2);
        assert_eq!(volume.palette(), fallback_palette().as_slice());
    }

    #[test]
    fn rgba_chunk_is_shifted_by_one() {
        let mut colors = Vec::new();
        for i in 0..PALETTE_LEN as u32 {
            colors.write_u32::<LittleEndian>(0xff00_0000 | i).unwrap();
        }
        let bytes = vox(&[
            size_chunk(1, 1, 1),
            xyzi_chunk(&[[0, 0, 0, 1]]),
            chunk(b"RGBA", &colors, &[]),
        ]);
        let volume = VoxelVolume::from_vox_bytes(&bytes).unwrap();

        assert_eq!(volume.palette()[0], 0);
        assert_eq!(volume.palette()[1], 0xff00_0000);
        assert_eq!(volume.palette()[255], 0xff00_00fe);
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let bytes = vox(&[
            chunk(b"PACK", &[1, 0, 0, 0], &[]),
            size_chunk(1, 1, 1),
            chunk(b"nTRN", &[0; 12], &[]),
            xyzi_chunk(&[]),
        ]);
        let volume = VoxelVolume::from_vox_bytes(&bytes).unwrap();
        assert_eq!(volume.solid_count(), 0);
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert!(matches!(
            VoxelVolume::from_vox_bytes(b"PNG\0abcd"),
            Err(VolumeError::BadMagic)
        ));
        assert!(matches!(
            VoxelVolume::from_vox_bytes(b"VO"),
            Err(VolumeError::BadMagic)
        ));
    }

    #[test]
    fn truncated_chunk_is_rejected() {
        let mut bytes = vox(&[size_chunk(2, 2, 2), xyzi_chunk(&[[0, 0, 0, 1]])]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            VoxelVolume::from_vox_bytes(&bytes),
            Err(VolumeError::Truncated { .. })
        ));
    }

    #[test]
    fn missing_model_chunks_are_reported() {
        let bytes = vox(&[size_chunk(2, 2, 2)]);
        assert!(matches!(
            VoxelVolume::from_vox_bytes(&bytes),
            Err(VolumeError::MissingChunk("XYZI"))
        ));
    }

    #[test]
    fn voxel_outside_the_model_is_rejected() {
        let bytes = vox(&[size_chunk(2, 2, 2), xyzi_chunk(&[[2, 0, 0, 1]])]);
        assert!(matches!(
            VoxelVolume::from_vox_bytes(&bytes),
            Err(VolumeError::VoxelOutOfBounds { x: 2, .. })
        ));
    }

    #[test]
    fn zero_size_is_rejected() {
        let bytes = vox(&[size_chunk(0, 2, 2), xyzi_chunk(&[])]);
        assert!(matches!(
            VoxelVolume::from_vox_bytes(&bytes),
            Err(VolumeError::InvalidSize(_))
        ));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.vox");
        std::fs::write(&path, vox(&[size_chunk(1, 1, 1), xyzi_chunk(&[[0, 0, 0, 3]])])).unwrap();

        let volume = VoxelVolume::from_vox_file(&path).unwrap();
        assert_eq!(volume.indices(), &[3]);

        let missing = VoxelVolume::from_vox_file(dir.path().join("nope.vox"));
        assert!(matches!(missing, Err(VolumeError::Io { .. })));
    }

    #[test]
    fn packing_puts_first_cell_in_low_byte() {
        let volume = VoxelVolume::new(
            UVec3::new(5, 1, 1),
            vec![1, 2, 3, 4, 5],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(volume.packed_indices(), vec![0x0403_0201, 0x0000_0005]);
        assert_eq!(volume.palette().len(), PALETTE_LEN);
    }

    #[test]
    fn demo_scene_has_content() {
        let volume = VoxelVolume::demo();
        assert!(volume.solid_count() > 0);
        assert_eq!(volume.get(UVec3::new(0, 0, 0)), Some(8));
        assert_eq!(volume.get(volume.size()), None);
    }
}
