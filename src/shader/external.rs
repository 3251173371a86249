// External shader tools (part of the Vulkan SDK)
//
// Both tools read the text from stdin ("-") and write the binary module to
// stdout ("-o -"), so nothing touches the filesystem.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{words_from_bytes, IrAssembler, ShaderStage, SourceCompiler};

/// `glslc` front end
pub struct Glslc {
    program: PathBuf,
}

impl Glslc {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self { program: program.as_ref().to_path_buf() }
    }
}

impl SourceCompiler for Glslc {
    fn compile(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>> {
        let stage_arg = format!("-fshader-stage={}", stage.short_name());
        let args = [stage_arg.as_str(), "--target-env=vulkan1.0", "-o", "-", "-"];
        let bytes = run_tool(&self.program, &args, source)?;
        words_from_bytes(&bytes)
            .with_context(|| format!("{} produced an invalid module", self.program.display()))
    }
}

/// `spirv-as` assembler
pub struct SpirvAs {
    program: PathBuf,
}

impl SpirvAs {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self { program: program.as_ref().to_path_buf() }
    }
}

impl IrAssembler for SpirvAs {
    fn assemble(&self, text: &str) -> Result<Vec<u32>> {
        let args = ["--target-env", "vulkan1.0", "-o", "-", "-"];
        let bytes = run_tool(&self.program, &args, text)?;
        words_from_bytes(&bytes)
            .with_context(|| format!("{} produced an invalid module", self.program.display()))
    }
}

/// Run `program args...`, feed `input` on stdin, return stdout
fn run_tool<S: AsRef<OsStr>>(program: &Path, args: &[S], input: &str) -> Result<Vec<u8>> {
    log::debug!("Running {}", program.display());

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            anyhow::bail!(
                "`{}` not found. Install the Vulkan SDK, set its path in config.toml, \
                 or build with --features shaderc and use toolchain = \"shaderc\"",
                program.display()
            )
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to start {}", program.display())),
    };

    // Shader text is small; the tool reads all of it before writing anything
    {
        let mut stdin = child.stdin.take().context("Tool stdin not captured")?;
        stdin
            .write_all(input.as_bytes())
            .with_context(|| format!("Failed to write to {}", program.display()))?;
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {}", program.display()))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        anyhow::bail!(
            "{} failed ({}):\n{}",
            program.display(),
            output.status,
            stderr.trim_end()
        );
    }
    if !stderr.trim().is_empty() {
        log::warn!("{}: {}", program.display(), stderr.trim_end());
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_reported_by_name() {
        let glslc = Glslc::new("definitely-not-a-real-glslc-binary");
        let err = glslc
            .compile(ShaderStage::Fragment, super::super::sources::FRAGMENT_GLSL)
            .unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-glslc-binary"));
    }

    #[test]
    fn missing_assembler_is_an_error() {
        let spirv_as = SpirvAs::new("definitely-not-a-real-spirv-as");
        assert!(spirv_as.assemble("OpCapability Shader").is_err());
    }
}
