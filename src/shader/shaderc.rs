// In-process front end and assembler backed by libshaderc
//
// Each collaborator owns its own compiler instance; they share nothing.

use anyhow::{Context, Result};
use shaderc::{CompileOptions, Compiler, EnvVersion, OptimizationLevel, ShaderKind, TargetEnv};

use super::{IrAssembler, ShaderStage, SourceCompiler};

fn vulkan_options() -> Result<CompileOptions<'static>> {
    let mut options = CompileOptions::new().context("Failed to initialize shaderc compile options")?;
    options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_0 as u32);
    // Specialization constants must survive untouched
    options.set_optimization_level(OptimizationLevel::Zero);
    Ok(options)
}

pub struct ShadercCompiler {
    compiler: Compiler,
    options: CompileOptions<'static>,
}

impl ShadercCompiler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            compiler: Compiler::new().context("Failed to initialize shaderc compiler")?,
            options: vulkan_options()?,
        })
    }
}

impl SourceCompiler for ShadercCompiler {
    fn compile(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>> {
        let kind = match stage {
            ShaderStage::Vertex => ShaderKind::Vertex,
            ShaderStage::Fragment => ShaderKind::Fragment,
        };
        let input_name = format!("embedded.{}", stage.short_name());

        let artifact = self
            .compiler
            .compile_into_spirv(source, kind, &input_name, "main", Some(&self.options))
            .with_context(|| format!("shaderc failed to compile {}", input_name))?;

        if artifact.get_num_warnings() > 0 {
            log::warn!("{}: {}", input_name, artifact.get_warning_messages());
        }
        Ok(artifact.as_binary().to_vec())
    }
}

pub struct ShadercAssembler {
    compiler: Compiler,
    options: CompileOptions<'static>,
}

impl ShadercAssembler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            compiler: Compiler::new().context("Failed to initialize shaderc assembler")?,
            options: vulkan_options()?,
        })
    }
}

impl IrAssembler for ShadercAssembler {
    fn assemble(&self, text: &str) -> Result<Vec<u32>> {
        let artifact = self
            .compiler
            .assemble(text, Some(&self.options))
            .context("shaderc failed to assemble SPIR-V")?;
        Ok(artifact.as_binary().to_vec())
    }
}
