// Embedded shader sources for the specialization sample
//
// The fragment shader is a tiny "uber shader": with `drawUserColor` left at
// its default it samples the texture, otherwise it writes (r, g, b, 1).

pub const VERTEX_GLSL: &str = r#"#version 400
#extension GL_ARB_separate_shader_objects : enable
#extension GL_ARB_shading_language_420pack : enable
layout (std140, binding = 0) uniform buf {
        mat4 mvp;
} ubuf;
layout (location = 0) in vec4 pos;
layout (location = 1) in vec2 inTexCoords;
layout (location = 0) out vec2 texcoord;
void main() {
   texcoord = inTexCoords;
   gl_Position = ubuf.mvp * pos;
}
"#;

pub const FRAGMENT_GLSL: &str = r#"#version 400
#extension GL_ARB_separate_shader_objects : enable
#extension GL_ARB_shading_language_420pack : enable
layout (binding = 1) uniform sampler2D tex;
layout (location = 0) in vec2 texcoord;
layout (location = 0) out vec4 outColor;
layout (constant_id = 5) const bool drawUserColor = false;
layout (constant_id = 7) const float r = 0.0f;
layout (constant_id = 8) const float g = 0.0f;
layout (constant_id = 9) const float b = 0.0f;
void main() {
   if (drawUserColor)
      outColor = vec4(r, g, b, 1.0);
   else
      outColor = textureLod(tex, texcoord, 0.0);
}
"#;

/// Disassembly of `FRAGMENT_GLSL` as the front end emits it.
///
/// The three color constants were folded into one result id (`%14`) that
/// carries SpecId 7, 8 and 9 at once, so r, g and b cannot be specialized
/// independently. Kept for reference; not used to build the pipeline.
pub const FRAGMENT_SPIRV_ASM_UNMODIFIED: &str = r#"; SPIR-V
; Version: 1.0
; Generator: Khronos Glslang Reference Front End; 1
; Bound: 29
; Schema: 0
               OpCapability Shader
          %1 = OpExtInstImport "GLSL.std.450"
               OpMemoryModel Logical GLSL450
               OpEntryPoint Fragment %4 "main" %13 %25
               OpExecutionMode %4 OriginUpperLeft
               OpSource GLSL 400
               OpSourceExtension "GL_ARB_separate_shader_objects"
               OpSourceExtension "GL_ARB_shading_language_420pack"
               OpName %4 "main"
               OpName %13 "outColor"
               OpName %21 "tex"
               OpName %25 "texcoord"
               OpDecorate %7 SpecId 5
               OpDecorate %13 Location 0
               OpDecorate %14 SpecId 7
               OpDecorate %14 SpecId 8
               OpDecorate %14 SpecId 9
               OpDecorate %21 DescriptorSet 0
               OpDecorate %21 Binding 1
               OpDecorate %25 Location 0
          %2 = OpTypeVoid
          %3 = OpTypeFunction %2
          %6 = OpTypeBool
          %7 = OpSpecConstantFalse %6
         %10 = OpTypeFloat 32
         %11 = OpTypeVector %10 4
         %12 = OpTypePointer Output %11
         %13 = OpVariable %12 Output
         %14 = OpSpecConstant %10 0
         %15 = OpConstant %10 1
         %18 = OpTypeImage %10 2D 0 0 0 1 Unknown
         %19 = OpTypeSampledImage %18
         %20 = OpTypePointer UniformConstant %19
         %21 = OpVariable %20 UniformConstant
         %23 = OpTypeVector %10 2
         %24 = OpTypePointer Input %23
         %25 = OpVariable %24 Input
         %27 = OpConstant %10 0
          %4 = OpFunction %2 None %3
          %5 = OpLabel
               OpSelectionMerge %9 None
               OpBranchConditional %7 %8 %17
          %8 = OpLabel
         %16 = OpCompositeConstruct %11 %14 %14 %14 %15
               OpStore %13 %16
               OpBranch %9
         %17 = OpLabel
         %22 = OpLoad %19 %21
         %26 = OpLoad %23 %25
         %28 = OpImageSampleExplicitLod %11 %22 %26 Lod %27
               OpStore %13 %28
               OpBranch %9
          %9 = OpLabel
               OpReturn
               OpFunctionEnd
"#;

/// Hand-edited listing: g and b get their own constants (`%29`, `%30`) so
/// SpecId 7, 8 and 9 each address a separate value. This is the assembly
/// the pipeline is built from.
pub const FRAGMENT_SPIRV_ASM: &str = r#"; SPIR-V
; Version: 1.0
; Generator: Khronos Glslang Reference Front End; 1
; Bound: 32
; Schema: 0
               OpCapability Shader
          %1 = OpExtInstImport "GLSL.std.450"
               OpMemoryModel Logical GLSL450
               OpEntryPoint Fragment %4 "main" %13 %25
               OpExecutionMode %4 OriginUpperLeft
               OpSource GLSL 400
               OpSourceExtension "GL_ARB_separate_shader_objects"
               OpSourceExtension "GL_ARB_shading_language_420pack"
               OpName %4 "main"
               OpName %13 "outColor"
               OpName %21 "tex"
               OpName %25 "texcoord"
               OpDecorate %7 SpecId 5
               OpDecorate %13 Location 0
               OpDecorate %14 SpecId 7
               OpDecorate %29 SpecId 8
               OpDecorate %30 SpecId 9
               OpDecorate %21 DescriptorSet 0
               OpDecorate %21 Binding 1
               OpDecorate %25 Location 0
          %2 = OpTypeVoid
          %3 = OpTypeFunction %2
          %6 = OpTypeBool
          %7 = OpSpecConstantFalse %6
         %10 = OpTypeFloat 32
         %11 = OpTypeVector %10 4
         %12 = OpTypePointer Output %11
         %13 = OpVariable %12 Output
         %14 = OpSpecConstant %10 0
         %29 = OpSpecConstant %10 0.0
         %30 = OpSpecConstant %10 0.0
         %15 = OpConstant %10 1
         %18 = OpTypeImage %10 2D 0 0 0 1 Unknown
         %19 = OpTypeSampledImage %18
         %20 = OpTypePointer UniformConstant %19
         %21 = OpVariable %20 UniformConstant
         %23 = OpTypeVector %10 2
         %24 = OpTypePointer Input %23
         %25 = OpVariable %24 Input
         %27 = OpConstant %10 0
          %4 = OpFunction %2 None %3
          %5 = OpLabel
               OpSelectionMerge %9 None
               OpBranchConditional %7 %8 %17
          %8 = OpLabel
         %16 = OpCompositeConstruct %11 %14 %29 %30 %15
               OpStore %13 %16
               OpBranch %9
         %17 = OpLabel
         %22 = OpLoad %19 %21
         %26 = OpLoad %23 %25
         %28 = OpImageSampleExplicitLod %11 %22 %26 Lod %27
               OpStore %13 %28
               OpBranch %9
          %9 = OpLabel
               OpReturn
               OpFunctionEnd
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_id_lines(listing: &str) -> Vec<&str> {
        listing.lines().map(str::trim).filter(|l| l.contains("SpecId")).collect()
    }

    #[test]
    fn hand_edited_listing_gives_each_color_its_own_constant() {
        assert_eq!(
            spec_id_lines(FRAGMENT_SPIRV_ASM),
            vec![
                "OpDecorate %7 SpecId 5",
                "OpDecorate %14 SpecId 7",
                "OpDecorate %29 SpecId 8",
                "OpDecorate %30 SpecId 9",
            ]
        );
        assert!(FRAGMENT_SPIRV_ASM.contains("; Bound: 32"));
        assert!(FRAGMENT_SPIRV_ASM.contains("OpCompositeConstruct %11 %14 %29 %30 %15"));
    }

    #[test]
    fn unmodified_listing_shares_one_constant() {
        let lines = spec_id_lines(FRAGMENT_SPIRV_ASM_UNMODIFIED);
        assert_eq!(lines.iter().filter(|l| l.starts_with("OpDecorate %14")).count(), 3);
    }

    #[test]
    fn glsl_declares_the_four_constants() {
        for id in crate::specialization::FRAGMENT_CONSTANT_IDS {
            assert!(FRAGMENT_GLSL.contains(&format!("constant_id = {})", id)));
        }
    }
}
