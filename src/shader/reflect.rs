// Minimal SPIR-V reflection: which specialization constants does a module declare?
//
// Walks the instruction stream once, collecting `OpDecorate <id> SpecId <n>`
// and the result type of every `OpSpecConstant*`. Anything else is skipped.

use anyhow::Result;
use std::collections::HashMap;

use super::SPIRV_MAGIC;
use crate::specialization::DeclaredConstant;

pub const HEADER_WORDS: usize = 5;

const OP_TYPE_BOOL: u32 = 20;
const OP_TYPE_INT: u32 = 21;
const OP_TYPE_FLOAT: u32 = 22;
const OP_SPEC_CONSTANT_TRUE: u32 = 48;
const OP_SPEC_CONSTANT_FALSE: u32 = 49;
const OP_SPEC_CONSTANT: u32 = 50;
const OP_DECORATE: u32 = 71;
const DECORATION_SPEC_ID: u32 = 1;

/// Constants declared with a SpecId, sorted by id
pub fn declared_spec_constants(words: &[u32]) -> Result<Vec<DeclaredConstant>> {
    if words.len() < HEADER_WORDS || words[0] != SPIRV_MAGIC {
        anyhow::bail!("Not a SPIR-V module");
    }

    // result id -> byte width of scalar type
    let mut type_width: HashMap<u32, u32> = HashMap::new();
    // result id -> type id of spec constant
    let mut constant_type: HashMap<u32, u32> = HashMap::new();
    // (spec id, target result id)
    let mut spec_ids: Vec<(u32, u32)> = Vec::new();

    let mut cursor = HEADER_WORDS;
    while cursor < words.len() {
        let word_count = (words[cursor] >> 16) as usize;
        let opcode = words[cursor] & 0xffff;
        if word_count == 0 || cursor + word_count > words.len() {
            anyhow::bail!("Malformed instruction at word {}", cursor);
        }
        let operands = &words[cursor + 1..cursor + word_count];

        match opcode {
            // Bool spec constants are fed a 32-bit VkBool32
            OP_TYPE_BOOL if !operands.is_empty() => {
                type_width.insert(operands[0], 4);
            }
            OP_TYPE_INT | OP_TYPE_FLOAT if operands.len() >= 2 => {
                type_width.insert(operands[0], operands[1] / 8);
            }
            OP_SPEC_CONSTANT_TRUE | OP_SPEC_CONSTANT_FALSE | OP_SPEC_CONSTANT if operands.len() >= 2 => {
                constant_type.insert(operands[1], operands[0]);
            }
            OP_DECORATE if operands.len() >= 3 && operands[1] == DECORATION_SPEC_ID => {
                spec_ids.push((operands[2], operands[0]));
            }
            _ => {}
        }

        cursor += word_count;
    }

    let mut declared = Vec::with_capacity(spec_ids.len());
    for (id, target) in spec_ids {
        let size = constant_type
            .get(&target)
            .and_then(|ty| type_width.get(ty))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("SpecId {} decorates %{}, which is not a scalar spec constant", id, target))?;
        declared.push(DeclaredConstant { id, size });
    }
    declared.sort_by_key(|d| d.id);
    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(opcode: u32, operands: &[u32]) -> Vec<u32> {
        let mut out = vec![((operands.len() as u32 + 1) << 16) | opcode];
        out.extend_from_slice(operands);
        out
    }

    fn module(body: &[Vec<u32>]) -> Vec<u32> {
        let mut words = vec![SPIRV_MAGIC, 0x0001_0000, 0, 32, 0];
        for i in body {
            words.extend_from_slice(i);
        }
        words
    }

    /// Same declarations as the hand-edited fragment listing
    fn specialized_fragment() -> Vec<u32> {
        module(&[
            inst(17, &[1]), // OpCapability Shader
            inst(OP_DECORATE, &[7, DECORATION_SPEC_ID, 5]),
            inst(OP_DECORATE, &[13, 30, 0]), // Location 0
            inst(OP_DECORATE, &[14, DECORATION_SPEC_ID, 7]),
            inst(OP_DECORATE, &[29, DECORATION_SPEC_ID, 8]),
            inst(OP_DECORATE, &[30, DECORATION_SPEC_ID, 9]),
            inst(OP_TYPE_BOOL, &[6]),
            inst(OP_SPEC_CONSTANT_FALSE, &[6, 7]),
            inst(OP_TYPE_FLOAT, &[10, 32]),
            inst(OP_SPEC_CONSTANT, &[10, 14, 0]),
            inst(OP_SPEC_CONSTANT, &[10, 29, 0]),
            inst(OP_SPEC_CONSTANT, &[10, 30, 0]),
        ])
    }

    #[test]
    fn finds_sample_constants() {
        let declared = declared_spec_constants(&specialized_fragment()).unwrap();
        assert_eq!(
            declared,
            vec![
                DeclaredConstant { id: 5, size: 4 },
                DeclaredConstant { id: 7, size: 4 },
                DeclaredConstant { id: 8, size: 4 },
                DeclaredConstant { id: 9, size: 4 },
            ]
        );
    }

    #[test]
    fn one_constant_with_three_spec_ids() {
        let words = module(&[
            inst(OP_DECORATE, &[14, DECORATION_SPEC_ID, 7]),
            inst(OP_DECORATE, &[14, DECORATION_SPEC_ID, 8]),
            inst(OP_DECORATE, &[14, DECORATION_SPEC_ID, 9]),
            inst(OP_TYPE_FLOAT, &[10, 32]),
            inst(OP_SPEC_CONSTANT, &[10, 14, 0]),
        ]);
        let ids: Vec<u32> = declared_spec_constants(&words).unwrap().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
    }

    #[test]
    fn double_width_constant() {
        let words = module(&[
            inst(OP_DECORATE, &[3, DECORATION_SPEC_ID, 2]),
            inst(OP_TYPE_FLOAT, &[4, 64]),
            inst(OP_SPEC_CONSTANT, &[4, 3, 0, 0]),
        ]);
        assert_eq!(declared_spec_constants(&words).unwrap(), vec![DeclaredConstant { id: 2, size: 8 }]);
    }

    #[test]
    fn spec_id_on_non_constant_is_an_error() {
        let words = module(&[inst(OP_DECORATE, &[3, DECORATION_SPEC_ID, 2])]);
        assert!(declared_spec_constants(&words).is_err());
    }

    #[test]
    fn truncated_instruction_is_an_error() {
        let mut words = specialized_fragment();
        words.push((4 << 16) | OP_DECORATE);
        words.push(1);
        assert!(declared_spec_constants(&words).is_err());
    }

    #[test]
    fn works_with_block_verification() {
        use crate::specialization::{fragment_block, SpecializationError, SpecializationMode};

        let declared = declared_spec_constants(&specialized_fragment()).unwrap();
        let block = fragment_block(SpecializationMode::FullColor, true, [0.0, 0.0, 1.0]).unwrap();
        block.verify_declared(&declared).unwrap();

        let flag_only = module(&[
            inst(OP_DECORATE, &[7, DECORATION_SPEC_ID, 5]),
            inst(OP_TYPE_BOOL, &[6]),
            inst(OP_SPEC_CONSTANT_TRUE, &[6, 7]),
        ]);
        let declared = declared_spec_constants(&flag_only).unwrap();
        assert_eq!(block.verify_declared(&declared).unwrap_err(), SpecializationError::UndeclaredId(7));
    }
}
