// Shader acquisition
//
// Two independent ways of turning text into a SPIR-V module:
// - SourceCompiler: GLSL -> SPIR-V words (front end)
// - IrAssembler:    SPIR-V assembly -> SPIR-V words
//
// Which one feeds the fragment stage is a static config choice. Both only
// promise a sequence of 32-bit words; nothing downstream knows which path
// produced them.

pub mod external;
pub mod reflect;
#[cfg(feature = "shaderc")]
pub mod shaderc;
pub mod sources;

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;

use crate::config::ShaderConfig;

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Short stage name as used by GLSL tooling (`vert`, `frag`)
    pub fn short_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// High-level source -> SPIR-V
pub trait SourceCompiler {
    fn compile(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>>;
}

/// Textual SPIR-V -> binary SPIR-V
pub trait IrAssembler {
    fn assemble(&self, text: &str) -> Result<Vec<u32>>;
}

/// Where the fragment module comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FragmentSource {
    /// Hand-edited SPIR-V assembly listing
    #[default]
    Assembly,
    /// Embedded GLSL through the front end
    Glsl,
}

/// Which implementation backs the two collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Toolchain {
    /// `glslc` / `spirv-as` executables
    #[default]
    External,
    /// libshaderc linked in (cargo feature `shaderc`)
    Shaderc,
}

/// The compiler + assembler pair chosen by configuration
pub struct ShaderTools {
    pub compiler: Box<dyn SourceCompiler>,
    pub assembler: Box<dyn IrAssembler>,
}

impl ShaderTools {
    pub fn from_config(config: &ShaderConfig) -> Result<Self> {
        match config.toolchain {
            Toolchain::External => Ok(Self {
                compiler: Box::new(external::Glslc::new(&config.glslc)),
                assembler: Box::new(external::SpirvAs::new(&config.spirv_as)),
            }),
            #[cfg(feature = "shaderc")]
            Toolchain::Shaderc => Ok(Self {
                compiler: Box::new(self::shaderc::ShadercCompiler::new()?),
                assembler: Box::new(self::shaderc::ShadercAssembler::new()?),
            }),
            #[cfg(not(feature = "shaderc"))]
            Toolchain::Shaderc => {
                anyhow::bail!("shaders.toolchain = \"shaderc\" needs the `shaderc` cargo feature")
            }
        }
    }

    pub fn vertex_words(&self) -> Result<Vec<u32>> {
        self.compiler
            .compile(ShaderStage::Vertex, sources::VERTEX_GLSL)
            .context("Failed to compile vertex shader")
    }

    pub fn fragment_words(&self, source: FragmentSource) -> Result<Vec<u32>> {
        match source {
            FragmentSource::Assembly => {
                log::info!("Fragment shader: assembling hand-edited SPIR-V listing");
                self.assembler
                    .assemble(sources::FRAGMENT_SPIRV_ASM)
                    .context("Failed to assemble fragment shader")
            }
            FragmentSource::Glsl => {
                log::info!("Fragment shader: compiling GLSL");
                self.compiler
                    .compile(ShaderStage::Fragment, sources::FRAGMENT_GLSL)
                    .context("Failed to compile fragment shader")
            }
        }
    }
}

/// Decode a SPIR-V binary, accepting either byte order
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("SPIR-V binary is {} bytes, not a multiple of 4", bytes.len());
    }
    if bytes.len() < 4 * reflect::HEADER_WORDS {
        anyhow::bail!("SPIR-V binary is too short for a module header ({} bytes)", bytes.len());
    }

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let decode: fn([u8; 4]) -> u32 = if u32::from_le_bytes(magic) == SPIRV_MAGIC {
        u32::from_le_bytes
    } else if u32::from_be_bytes(magic) == SPIRV_MAGIC {
        u32::from_be_bytes
    } else {
        anyhow::bail!("Not a SPIR-V binary (magic {:#010x})", u32::from_le_bytes(magic));
    };

    Ok(bytes
        .chunks_exact(4)
        .map(|c| decode([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(le: bool) -> Vec<u8> {
        [SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]
            .iter()
            .flat_map(|w| if le { w.to_le_bytes() } else { w.to_be_bytes() })
            .collect()
    }

    #[test]
    fn decodes_little_endian() {
        let words = words_from_bytes(&header_bytes(true)).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]);
    }

    #[test]
    fn decodes_big_endian() {
        let words = words_from_bytes(&header_bytes(false)).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words[3], 8);
    }

    #[test]
    fn rejects_ragged_length() {
        let mut bytes = header_bytes(true);
        bytes.push(0);
        assert!(words_from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header_bytes(true);
        bytes[0] = 0xff;
        let err = words_from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("Not a SPIR-V binary"));
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(words_from_bytes(&SPIRV_MAGIC.to_le_bytes()).is_err());
    }

    #[cfg(not(feature = "shaderc"))]
    #[test]
    fn shaderc_toolchain_needs_feature() {
        let config = ShaderConfig {
            toolchain: Toolchain::Shaderc,
            ..Default::default()
        };
        assert!(ShaderTools::from_config(&config).is_err());
    }

    #[test]
    fn stage_names() {
        assert_eq!(ShaderStage::Vertex.short_name(), "vert");
        assert_eq!(ShaderStage::Fragment.vk_stage(), vk::ShaderStageFlags::FRAGMENT);
    }
}
