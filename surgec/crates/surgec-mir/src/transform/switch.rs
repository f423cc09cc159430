//! Switch-tag recognizer.
//!
//! Lowered `compare` expressions arrive as chains of `tag_test` + `if` on a
//! common scrutinee. This pass collapses a chain of two or more tags into a
//! single `switch_tag` terminator and removes the now-redundant `tag_test`
//! from the starting block. The set of (tag → target) mappings equals the
//! original chain's and the default is the final else; single-tag chains are
//! left alone.

use crate::ir::*;
use surgec_util::FxHashSet;

/// The `(tmp = tag_test(v, Tag); if tmp -> then else else)` shape.
struct TagTestShape {
    scrutinee: Place,
    tag: surgec_util::Symbol,
    then_bb: BlockId,
    else_bb: BlockId,
}

fn match_shape(block: &Block) -> Option<TagTestShape> {
    let Instr::Assign { dst, src } = block.instrs.last()? else {
        return None;
    };
    let tmp = dst.as_plain_local()?;
    let Rvalue::TagTest { value, tag } = src else {
        return None;
    };
    let scrutinee = value.place()?.clone();
    let Terminator::If { cond, then_bb, else_bb } = &block.term else {
        return None;
    };
    if cond.place().and_then(Place::as_plain_local) != Some(tmp) {
        return None;
    }
    Some(TagTestShape {
        scrutinee,
        tag: *tag,
        then_bb: *then_bb,
        else_bb: *else_bb,
    })
}

pub fn recognize_switch_tag(func: &mut Func) {
    for start in func.blocks.indices().collect::<Vec<_>>() {
        let Some(head) = match_shape(&func.blocks[start]) else {
            continue;
        };

        let mut cases = vec![SwitchCase {
            tag: head.tag,
            target: head.then_bb,
        }];
        let mut seen_tags: FxHashSet<surgec_util::Symbol> = FxHashSet::default();
        seen_tags.insert(head.tag);
        let mut visited: FxHashSet<BlockId> = FxHashSet::default();
        visited.insert(start);

        // Walk the else chain while each successor repeats the shape on the
        // same scrutinee. Chain links must contain nothing but the test so
        // dropping them loses no side effects.
        let mut default = head.else_bb;
        loop {
            if visited.contains(&default) {
                // Cycle: stop extension, keep the current block as default.
                break;
            }
            let Some(link) = func.blocks.get(default) else {
                break;
            };
            if link.instrs.len() != 1 {
                break;
            }
            let Some(shape) = match_shape(link) else {
                break;
            };
            if shape.scrutinee != head.scrutinee || seen_tags.contains(&shape.tag) {
                break;
            }
            visited.insert(default);
            seen_tags.insert(shape.tag);
            cases.push(SwitchCase {
                tag: shape.tag,
                target: shape.then_bb,
            });
            default = shape.else_bb;
        }

        if cases.len() < 2 {
            continue;
        }

        let scrutinee_ty = func.blocks[start]
            .instrs
            .last()
            .and_then(|i| match i {
                Instr::Assign {
                    src: Rvalue::TagTest { value, .. },
                    ..
                } => Some(value.ty),
                _ => None,
            })
            .expect("shape checked above");

        let block = &mut func.blocks[start];
        block.instrs.pop();
        block.term = Terminator::SwitchTag {
            value: Operand::copy(head.scrutinee, scrutinee_ty),
            cases,
            default,
        };
    }
}
