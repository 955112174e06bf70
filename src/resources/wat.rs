//! `.wat` packed material files
//!
//! Layout, little-endian:
//!
//! | bytes     | content                                              |
//! |-----------|------------------------------------------------------|
//! | 0..128    | [`WatHeader`]                                        |
//! | 128..152  | `albedo.xyz, metallic, roughness, transparency` f32  |
//! | 152..     | present RGBA8 blocks, `width * height * 4` bytes each |
//!
//! Block 0 is albedo RGBA, block 1 normal RGB with depth in A, block 2
//! metallic R, ambient occlusion G and roughness B.

use std::io::{Read, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use image::{DynamicImage, GenericImageView};
use static_assertions::{const_assert, const_assert_eq};
use thiserror::Error;

use crate::backend::types::{AddressMode, FilterMode, SamplerDescriptor};
use crate::resources::material::TextureUnit;

pub const WAT_MAGIC: u32 = 0x5741_5443;
pub const WAT_VERSION_MAJOR: u16 = 1;
pub const WAT_VERSION_MINOR: u16 = 0;
pub const WAT_HEADER_SIZE: usize = 128;
pub const WAT_FLOAT_COUNT: usize = 6;
pub const WAT_BLOCK_COUNT: usize = 3;

const PARAMS_SIZE: usize = WAT_FLOAT_COUNT * 4;

#[derive(Error, Debug)]
pub enum WatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("Unsupported version {major}.{minor}")]
    VersionMismatch { major: u16, minor: u16 },
    #[error("Truncated file: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Map size mismatch: {0}")]
    MapSizeMismatch(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl WatError {
    /// Whether a batch loader may skip the file and continue.
    ///
    /// A single blocking load still reports these as errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WatError::BadMagic(_) | WatError::VersionMismatch { .. } | WatError::Truncated { .. }
        )
    }
}

pub type WatResult<T> = Result<T, WatError>;

/// Fixed 128-byte file header
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WatHeader {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub unique_id: u64,
    pub min_filter: u8,
    pub mag_filter: u8,
    pub address_u: u8,
    pub address_v: u8,
    pub width: u16,
    pub height: u16,
    pub unit_flags: u32,
    pub has_block: [u8; 4],
    pub parallax_height_scale: f32,
    pub padding: [u32; 23],
}

const_assert_eq!(std::mem::size_of::<WatHeader>(), WAT_HEADER_SIZE);
const_assert!(cfg!(target_endian = "little"));

fn filter_to_u8(filter: FilterMode) -> u8 {
    match filter {
        FilterMode::Nearest => 0,
        FilterMode::Linear => 1,
    }
}

fn filter_from_u8(value: u8) -> WatResult<FilterMode> {
    match value {
        0 => Ok(FilterMode::Nearest),
        1 => Ok(FilterMode::Linear),
        other => Err(WatError::InvalidHeader(format!("filter mode {other}"))),
    }
}

fn address_to_u8(mode: AddressMode) -> u8 {
    match mode {
        AddressMode::ClampToEdge => 0,
        AddressMode::Repeat => 1,
        AddressMode::MirrorRepeat => 2,
    }
}

fn address_from_u8(value: u8) -> WatResult<AddressMode> {
    match value {
        0 => Ok(AddressMode::ClampToEdge),
        1 => Ok(AddressMode::Repeat),
        2 => Ok(AddressMode::MirrorRepeat),
        other => Err(WatError::InvalidHeader(format!("address mode {other}"))),
    }
}

/// A decoded `.wat` file
#[derive(Debug, Clone, PartialEq)]
pub struct WatFile {
    pub unique_id: u64,
    pub sampler: SamplerDescriptor,
    pub width: u16,
    pub height: u16,
    pub units: TextureUnit,
    pub parallax_height_scale: f32,
    pub albedo: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub transparency: f32,
    /// RGBA8 pixel blocks, `None` when absent
    pub blocks: [Option<Vec<u8>>; WAT_BLOCK_COUNT],
}

impl Default for WatFile {
    fn default() -> Self {
        Self {
            unique_id: 0,
            sampler: SamplerDescriptor::default(),
            width: 0,
            height: 0,
            units: TextureUnit::empty(),
            parallax_height_scale: 0.0,
            albedo: Vec3::ONE,
            metallic: 0.0,
            roughness: 0.5,
            transparency: 0.0,
            blocks: [None, None, None],
        }
    }
}

impl WatFile {
    /// Byte length of one pixel block
    pub fn block_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub fn has_block(&self, index: usize) -> bool {
        self.blocks.get(index).is_some_and(Option::is_some)
    }

    pub fn header(&self) -> WatHeader {
        let mut has_block = [0u8; 4];
        for (flag, block) in has_block.iter_mut().zip(&self.blocks) {
            *flag = block.is_some() as u8;
        }
        WatHeader {
            magic: WAT_MAGIC,
            version_major: WAT_VERSION_MAJOR,
            version_minor: WAT_VERSION_MINOR,
            unique_id: self.unique_id,
            min_filter: filter_to_u8(self.sampler.min_filter),
            mag_filter: filter_to_u8(self.sampler.mag_filter),
            address_u: address_to_u8(self.sampler.address_mode_u),
            address_v: address_to_u8(self.sampler.address_mode_v),
            width: self.width,
            height: self.height,
            unit_flags: self.units.bits(),
            has_block,
            parallax_height_scale: self.parallax_height_scale,
            padding: [0; 23],
        }
    }

    pub fn to_bytes(&self) -> WatResult<Vec<u8>> {
        let block_size = self.block_size();
        if let Some(bad) = self.blocks.iter().flatten().find(|b| b.len() != block_size) {
            return Err(WatError::MapSizeMismatch(format!(
                "block of {} bytes, expected {}",
                bad.len(),
                block_size
            )));
        }

        let mut bytes = Vec::with_capacity(WAT_HEADER_SIZE + PARAMS_SIZE + 3 * block_size);
        bytes.extend_from_slice(bytemuck::bytes_of(&self.header()));
        let params: [f32; WAT_FLOAT_COUNT] = [
            self.albedo.x,
            self.albedo.y,
            self.albedo.z,
            self.metallic,
            self.roughness,
            self.transparency,
        ];
        bytes.extend_from_slice(bytemuck::cast_slice(&params));
        for block in self.blocks.iter().flatten() {
            bytes.extend_from_slice(block);
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> WatResult<Self> {
        if bytes.len() < WAT_HEADER_SIZE {
            return Err(WatError::Truncated {
                expected: WAT_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let header: WatHeader = bytemuck::pod_read_unaligned(&bytes[..WAT_HEADER_SIZE]);
        if header.magic != WAT_MAGIC {
            return Err(WatError::BadMagic(header.magic));
        }
        if header.version_major != WAT_VERSION_MAJOR || header.version_minor != WAT_VERSION_MINOR {
            return Err(WatError::VersionMismatch {
                major: header.version_major,
                minor: header.version_minor,
            });
        }

        let block_size = header.width as usize * header.height as usize * 4;
        let present = header.has_block[..WAT_BLOCK_COUNT]
            .iter()
            .filter(|b| **b != 0)
            .count();
        let expected = WAT_HEADER_SIZE + PARAMS_SIZE + present * block_size;
        if bytes.len() < expected {
            return Err(WatError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let params: [f32; WAT_FLOAT_COUNT] =
            bytemuck::pod_read_unaligned(&bytes[WAT_HEADER_SIZE..WAT_HEADER_SIZE + PARAMS_SIZE]);

        let mut offset = WAT_HEADER_SIZE + PARAMS_SIZE;
        let mut blocks: [Option<Vec<u8>>; WAT_BLOCK_COUNT] = [None, None, None];
        for (block, flag) in blocks.iter_mut().zip(header.has_block) {
            if flag != 0 {
                *block = Some(bytes[offset..offset + block_size].to_vec());
                offset += block_size;
            }
        }

        Ok(Self {
            unique_id: header.unique_id,
            sampler: SamplerDescriptor {
                min_filter: filter_from_u8(header.min_filter)?,
                mag_filter: filter_from_u8(header.mag_filter)?,
                address_mode_u: address_from_u8(header.address_u)?,
                address_mode_v: address_from_u8(header.address_v)?,
            },
            width: header.width,
            height: header.height,
            units: TextureUnit::from_bits_truncate(header.unit_flags),
            parallax_height_scale: header.parallax_height_scale,
            albedo: Vec3::new(params[0], params[1], params[2]),
            metallic: params[3],
            roughness: params[4],
            transparency: params[5],
            blocks,
        })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> WatResult<Self> {
        let mut bytes = Vec::new();
        std::fs::File::open(path)?.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> WatResult<()> {
        let bytes = self.to_bytes()?;
        std::fs::File::create(path)?.write_all(&bytes)?;
        Ok(())
    }
}

/// Source images for [`pack_maps`]; every present map must share one size
#[derive(Debug, Clone, Default)]
pub struct MaterialMaps {
    pub albedo: Option<DynamicImage>,
    pub normal: Option<DynamicImage>,
    pub depth: Option<DynamicImage>,
    pub metallic: Option<DynamicImage>,
    pub ambient_occlusion: Option<DynamicImage>,
    pub roughness: Option<DynamicImage>,
}

impl MaterialMaps {
    fn present(&self) -> impl Iterator<Item = (&'static str, &DynamicImage)> {
        [
            ("albedo", &self.albedo),
            ("normal", &self.normal),
            ("depth", &self.depth),
            ("metallic", &self.metallic),
            ("ambient_occlusion", &self.ambient_occlusion),
            ("roughness", &self.roughness),
        ]
        .into_iter()
        .filter_map(|(name, map)| map.as_ref().map(|m| (name, m)))
    }
}

fn luma(map: &Option<DynamicImage>) -> Option<image::GrayImage> {
    map.as_ref().map(DynamicImage::to_luma8)
}

/// Pack PNG-derived maps into a `.wat` file carrying `params`' scalar values.
pub fn pack_maps(maps: &MaterialMaps, params: &WatFile) -> WatResult<WatFile> {
    let mut present = maps.present();
    let Some((_, first)) = present.next() else {
        return Ok(WatFile {
            width: 0,
            height: 0,
            units: TextureUnit::empty(),
            blocks: [None, None, None],
            ..params.clone()
        });
    };
    let (width, height) = first.dimensions();
    if let Some((name, map)) = present.find(|(_, m)| m.dimensions() != (width, height)) {
        return Err(WatError::MapSizeMismatch(format!(
            "{name} is {:?}, expected {:?}",
            map.dimensions(),
            (width, height)
        )));
    }
    let (Ok(w16), Ok(h16)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(WatError::MapSizeMismatch(format!("{width}x{height} exceeds u16")));
    };

    let texels = (width * height) as usize;
    let mut units = TextureUnit::empty();
    let mut blocks: [Option<Vec<u8>>; WAT_BLOCK_COUNT] = [None, None, None];

    if let Some(albedo) = &maps.albedo {
        units |= TextureUnit::ALBEDO | TextureUnit::BLOCK0;
        blocks[0] = Some(albedo.to_rgba8().into_raw());
    }

    if maps.normal.is_some() || maps.depth.is_some() {
        let normal = maps.normal.as_ref().map(DynamicImage::to_rgb8);
        let depth = luma(&maps.depth);
        let mut block = Vec::with_capacity(texels * 4);
        for i in 0..texels {
            let (x, y) = ((i as u32) % width, (i as u32) / width);
            let n = normal.as_ref().map_or([128, 128, 255], |n| n.get_pixel(x, y).0);
            let d = depth.as_ref().map_or(0, |d| d.get_pixel(x, y).0[0]);
            block.extend_from_slice(&[n[0], n[1], n[2], d]);
        }
        units |= TextureUnit::BLOCK1;
        units.set(TextureUnit::NORMAL, normal.is_some());
        units.set(TextureUnit::DEPTH, depth.is_some());
        blocks[1] = Some(block);
    }

    if maps.metallic.is_some() || maps.ambient_occlusion.is_some() || maps.roughness.is_some() {
        let metallic = luma(&maps.metallic);
        let ao = luma(&maps.ambient_occlusion);
        let roughness = luma(&maps.roughness);
        let scalar = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        let mut block = Vec::with_capacity(texels * 4);
        for i in 0..texels {
            let (x, y) = ((i as u32) % width, (i as u32) / width);
            let m = metallic.as_ref().map_or(scalar(params.metallic), |m| m.get_pixel(x, y).0[0]);
            let a = ao.as_ref().map_or(255, |a| a.get_pixel(x, y).0[0]);
            let r = roughness.as_ref().map_or(scalar(params.roughness), |r| r.get_pixel(x, y).0[0]);
            block.extend_from_slice(&[m, a, r, 255]);
        }
        units |= TextureUnit::BLOCK2;
        units.set(TextureUnit::METALLIC, metallic.is_some());
        units.set(TextureUnit::AO, ao.is_some());
        units.set(TextureUnit::ROUGHNESS, roughness.is_some());
        blocks[2] = Some(block);
    }

    Ok(WatFile {
        width: w16,
        height: h16,
        units,
        blocks,
        ..params.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(seed: u8) -> Vec<u8> {
        (0..64 * 64 * 4).map(|i: usize| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn sample_file() -> WatFile {
        WatFile {
            unique_id: 0xDEAD_BEEF_0042,
            sampler: SamplerDescriptor {
                address_mode_u: AddressMode::Repeat,
                ..SamplerDescriptor::nearest()
            },
            width: 64,
            height: 64,
            units: TextureUnit::ALBEDO | TextureUnit::BLOCK0 | TextureUnit::BLOCK2,
            parallax_height_scale: 0.05,
            albedo: Vec3::new(0.8, 0.6, 0.4),
            metallic: 0.25,
            roughness: 0.75,
            transparency: 0.0,
            blocks: [Some(pattern(1)), None, Some(pattern(9))],
        }
    }

    #[test]
    fn test_header_layout() {
        let header = sample_file().header();
        let bytes = bytemuck::bytes_of(&header);
        assert_eq!(bytes.len(), 128);
        assert_eq!(&bytes[0..4], &WAT_MAGIC.to_le_bytes());
        assert_eq!(&bytes[28..32], &[1, 0, 1, 0]);
    }

    #[test]
    fn test_roundtrip_preserves_blocks() {
        let file = sample_file();
        let bytes = file.to_bytes().unwrap();
        assert_eq!(bytes.len(), 128 + 24 + 2 * 64 * 64 * 4);

        let decoded = WatFile::from_bytes(&bytes).unwrap();
        assert!(decoded.has_block(0));
        assert!(!decoded.has_block(1));
        assert!(decoded.has_block(2));
        assert_eq!((decoded.width, decoded.height), (64, 64));
        assert_eq!(decoded.blocks[0].as_deref(), Some(pattern(1).as_slice()));
        assert_eq!(decoded, file);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = sample_file().to_bytes().unwrap();
        bytes[0] ^= 0xFF;
        let err = WatFile::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, WatError::BadMagic(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_io_errors_are_not_recoverable() {
        let err = WatFile::read("/nonexistent/deferred-engine/missing.wat").unwrap_err();
        assert!(matches!(err, WatError::Io(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_version_mismatch_is_recoverable() {
        let mut bytes = sample_file().to_bytes().unwrap();
        bytes[6] = 3;
        let err = WatFile::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, WatError::VersionMismatch { major: 1, minor: 3 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_truncated_block() {
        let bytes = sample_file().to_bytes().unwrap();
        let err = WatFile::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, WatError::Truncated { .. }));
    }

    #[test]
    fn test_pack_maps_sets_units() {
        let albedo = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([200, 100, 50, 255]),
        ));
        let roughness = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([64])));
        let maps = MaterialMaps {
            albedo: Some(albedo),
            roughness: Some(roughness),
            ..Default::default()
        };

        let params = WatFile {
            metallic: 1.0,
            ..Default::default()
        };
        let packed = pack_maps(&maps, &params).unwrap();
        assert_eq!((packed.width, packed.height), (4, 4));
        assert!(packed.units.contains(TextureUnit::ALBEDO | TextureUnit::BLOCK0));
        assert!(packed.units.contains(TextureUnit::ROUGHNESS | TextureUnit::BLOCK2));
        assert!(!packed.units.intersects(TextureUnit::BLOCK1 | TextureUnit::METALLIC));
        assert_eq!(&packed.blocks[2].as_ref().unwrap()[..4], &[255, 255, 64, 255]);
    }

    #[test]
    fn test_pack_maps_rejects_mixed_sizes() {
        let maps = MaterialMaps {
            albedo: Some(DynamicImage::new_rgba8(4, 4)),
            depth: Some(DynamicImage::new_luma8(8, 8)),
            ..Default::default()
        };
        assert!(matches!(
            pack_maps(&maps, &WatFile::default()),
            Err(WatError::MapSizeMismatch(_))
        ));
    }
}
