//! Deterministic textual dump.
//!
//! The stable external artifact golden tests pin. Grammar, informally:
//!
//! ```text
//! global @g0: string                      // globals section, id order
//!
//! fn name(2) -> int64 {                   // funcs sorted by (name, sym)
//!   locals:
//!     %0: int64 [copy] x
//!   bb0:
//!     %2 = add %0, %1
//!     if %2 -> bb1 else bb2
//! }
//! ```
//!
//! Places print as `%N`/`@name` plus projections (`.*` deref, `.field`,
//! `[%N]` index). Operands: constants literally, `move %N`, `&%N`,
//! `&mut %N`. Output depends only on module content; every list printed is
//! either id-ordered or explicitly sorted.

use crate::ir::*;
use std::fmt::Write;
use surgec_sem::TypeInterner;

pub fn dump_module(module: &Module, types: &TypeInterner) -> String {
    let mut out = String::new();

    for global in module.globals.iter() {
        let _ = writeln!(
            out,
            "global @{}: {}{}",
            global.name,
            types.render(global.ty),
            if global.is_mut { " mut" } else { "" }
        );
    }
    if !module.globals.is_empty() {
        out.push('\n');
    }

    // Function order depends only on (name, sym).
    let mut order: Vec<&Func> = module.funcs.iter().collect();
    order.sort_by(|a, b| {
        a.name
            .as_str()
            .cmp(b.name.as_str())
            .then(a.sym.cmp(&b.sym))
    });

    for (i, func) in order.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        dump_func(&mut out, func, types, module);
    }
    out
}

fn dump_func(out: &mut String, func: &Func, types: &TypeInterner, module: &Module) {
    let _ = writeln!(
        out,
        "{}fn {}({}) -> {} {{",
        if func.is_async { "async " } else { "" },
        func.name,
        func.param_count,
        types.render(func.result)
    );

    if !func.locals.is_empty() {
        let _ = writeln!(out, "  locals:");
        for (lid, local) in func.locals.iter_enumerated() {
            let _ = writeln!(
                out,
                "    %{}: {} {:?} {}",
                lid.0,
                types.render(local.ty),
                local.flags,
                local.name
            );
        }
    }

    for (bb, block) in func.blocks.iter_enumerated() {
        let entry_mark = if bb == func.entry { " // entry" } else { "" };
        let _ = writeln!(out, "  bb{}:{}", bb.0, entry_mark);
        for instr in &block.instrs {
            let _ = writeln!(out, "    {}", render_instr(instr, module));
        }
        let _ = writeln!(out, "    {}", render_term(&block.term, module));
    }
    let _ = writeln!(out, "}}");
}

fn render_block(b: BlockId) -> String {
    if b.is_none() {
        "_".to_string()
    } else {
        format!("bb{}", b.0)
    }
}

fn render_place(place: &Place, module: &Module) -> String {
    let mut s = match place.root {
        PlaceRoot::Local(l) => format!("%{}", l.0),
        PlaceRoot::Global(g) => match module.globals.get(g) {
            Some(global) => format!("@{}", global.name),
            None => format!("@g{}", g.0),
        },
    };
    for proj in &place.proj {
        match proj {
            Projection::Deref => s.push_str(".*"),
            Projection::Field { name, .. } => {
                s.push('.');
                s.push_str(name.as_str());
            }
            Projection::Index { index } => {
                let _ = write!(s, "[%{}]", index.0);
            }
        }
    }
    s
}

fn render_const(c: &Const) -> String {
    match c {
        Const::Int { value, .. } => value.to_string(),
        Const::Float { value, .. } => {
            if value.fract() == 0.0 && value.is_finite() {
                format!("{:.1}", value)
            } else {
                value.to_string()
            }
        }
        Const::Bool(b) => b.to_string(),
        Const::Str(s) => format!("{:?}", s.as_str()),
        Const::Nothing => "nothing".to_string(),
        Const::FnAddr { name, .. } => format!("&fn {}", name),
    }
}

fn render_operand(op: &Operand, module: &Module) -> String {
    match &op.kind {
        OperandKind::Const(c) => render_const(c),
        OperandKind::Copy(p) => render_place(p, module),
        OperandKind::Move(p) => format!("move {}", render_place(p, module)),
        OperandKind::AddrOf(p) => format!("&{}", render_place(p, module)),
        OperandKind::AddrOfMut(p) => format!("&mut {}", render_place(p, module)),
    }
}

fn render_unop(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "neg",
        UnOp::Not => "not",
    }
}

fn render_binop(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Rem => "rem",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Le => "le",
        BinOp::Gt => "gt",
        BinOp::Ge => "ge",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::BitAnd => "band",
        BinOp::BitOr => "bor",
        BinOp::BitXor => "bxor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
    }
}

fn render_operands(ops: &[Operand], module: &Module) -> String {
    ops.iter()
        .map(|o| render_operand(o, module))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_rvalue(rv: &Rvalue, module: &Module) -> String {
    match rv {
        Rvalue::Use(op) => render_operand(op, module),
        Rvalue::Unary { op, operand } => {
            format!("{} {}", render_unop(*op), render_operand(operand, module))
        }
        Rvalue::Binary { op, lhs, rhs } => format!(
            "{} {}, {}",
            render_binop(*op),
            render_operand(lhs, module),
            render_operand(rhs, module)
        ),
        Rvalue::Cast { operand, .. } => format!("cast {}", render_operand(operand, module)),
        Rvalue::StructLit { fields, .. } => {
            format!("struct {{ {} }}", render_operands(fields, module))
        }
        Rvalue::ArrayLit { elems, .. } => format!("array [{}]", render_operands(elems, module)),
        Rvalue::TupleLit { elems, .. } => format!("tuple ({})", render_operands(elems, module)),
        Rvalue::Field { base, name, .. } => {
            format!("field {}.{}", render_operand(base, module), name)
        }
        Rvalue::Index { base, index } => format!(
            "index {}[{}]",
            render_operand(base, module),
            render_operand(index, module)
        ),
        Rvalue::TagTest { value, tag } => {
            format!("tag_test {}, {}", render_operand(value, module), tag)
        }
        Rvalue::TagPayload { value, tag, index } => format!(
            "tag_payload {}, {}, {}",
            render_operand(value, module),
            tag,
            index
        ),
        Rvalue::IterInit { iterable } => format!("iter_init {}", render_operand(iterable, module)),
        Rvalue::IterNext { iter } => format!("iter_next {}", render_operand(iter, module)),
        Rvalue::TypeTest { value, .. } => format!("type_test {}", render_operand(value, module)),
        Rvalue::HeirTest { value, .. } => format!("heir_test {}", render_operand(value, module)),
    }
}

fn render_callee(callee: &Callee, module: &Module) -> String {
    match callee {
        Callee::Sym { name, .. } => name.as_str().to_string(),
        Callee::Value(op) => format!("({})", render_operand(op, module)),
    }
}

fn render_dst_local(dst: Option<LocalId>) -> String {
    match dst {
        Some(d) => format!("%{} = ", d.0),
        None => String::new(),
    }
}

fn render_instr(instr: &Instr, module: &Module) -> String {
    match instr {
        Instr::Assign { dst, src } => format!(
            "{} = {}",
            render_place(dst, module),
            render_rvalue(src, module)
        ),
        Instr::Call { dst, callee, args } => {
            let prefix = match dst {
                Some(p) => format!("{} = ", render_place(p, module)),
                None => String::new(),
            };
            format!(
                "{}call {}({})",
                prefix,
                render_callee(callee, module),
                render_operands(args, module)
            )
        }
        Instr::Drop { place } => format!("drop {}", render_place(place, module)),
        Instr::EndBorrow { place } => format!("end_borrow {}", render_place(place, module)),
        Instr::Await { dst, task } => format!(
            "{}await {}",
            render_dst_local(*dst),
            render_operand(task, module)
        ),
        Instr::Spawn { dst, value } => {
            format!("%{} = spawn {}", dst.0, render_operand(value, module))
        }
        Instr::Poll { dst, task, ready, pend } => format!(
            "{}poll {} -> ready {}, pend {}",
            render_dst_local(*dst),
            render_operand(task, module),
            render_block(*ready),
            render_block(*pend)
        ),
        Instr::JoinAll { dst, scope, ready, pend } => format!(
            "{}join_all {} -> ready {}, pend {}",
            render_dst_local(*dst),
            render_operand(scope, module),
            render_block(*ready),
            render_block(*pend)
        ),
        Instr::ChanSend { chan, value, ready, pend } => format!(
            "chan_send {}, {} -> ready {}, pend {}",
            render_operand(chan, module),
            render_operand(value, module),
            render_block(*ready),
            render_block(*pend)
        ),
        Instr::ChanRecv { dst, chan, ready, pend } => format!(
            "{}chan_recv {} -> ready {}, pend {}",
            render_dst_local(*dst),
            render_operand(chan, module),
            render_block(*ready),
            render_block(*pend)
        ),
        Instr::Timeout { dst, task, millis, ready, pend } => format!(
            "{}timeout {}, {} -> ready {}, pend {}",
            render_dst_local(*dst),
            render_operand(task, module),
            render_operand(millis, module),
            render_block(*ready),
            render_block(*pend)
        ),
        Instr::Select { dst, arms, race, ready, pend } => {
            let rendered: Vec<String> = arms
                .iter()
                .map(|arm| match arm {
                    SelectArm::Task { task } => format!("task {}", render_operand(task, module)),
                    SelectArm::Recv { chan } => format!("recv {}", render_operand(chan, module)),
                    SelectArm::Send { chan, value } => format!(
                        "send {}, {}",
                        render_operand(chan, module),
                        render_operand(value, module)
                    ),
                    SelectArm::Timeout { millis } => {
                        format!("timeout {}", render_operand(millis, module))
                    }
                    SelectArm::Default => "default".to_string(),
                })
                .collect();
            format!(
                "{}{} [{}] -> ready {}, pend {}",
                render_dst_local(*dst),
                if *race { "race" } else { "select" },
                rendered.join(", "),
                render_block(*ready),
                render_block(*pend)
            )
        }
        Instr::Nop => "nop".to_string(),
    }
}

fn render_term(term: &Terminator, module: &Module) -> String {
    match term {
        Terminator::None => "<unterminated>".to_string(),
        Terminator::Return { value, early, cancelled, .. } => {
            let mut s = "return".to_string();
            if *early {
                s.push_str(" early");
            }
            if *cancelled {
                s.push_str(" cancelled");
            }
            if let Some(v) = value {
                let _ = write!(s, " {}", render_operand(v, module));
            }
            s
        }
        Terminator::AsyncYield { state } => {
            format!("async_yield {}", render_operand(state, module))
        }
        Terminator::AsyncReturn { state, value, .. } => {
            let mut s = format!("async_return {}", render_operand(state, module));
            if let Some(v) = value {
                let _ = write!(s, ", {}", render_operand(v, module));
            }
            s
        }
        Terminator::AsyncReturnCancelled { state } => {
            format!("async_return_cancelled {}", render_operand(state, module))
        }
        Terminator::Goto { target } => format!("goto {}", render_block(*target)),
        Terminator::If { cond, then_bb, else_bb } => format!(
            "if {} -> {} else {}",
            render_operand(cond, module),
            render_block(*then_bb),
            render_block(*else_bb)
        ),
        Terminator::SwitchTag { value, cases, default } => {
            let rendered: Vec<String> = cases
                .iter()
                .map(|c| format!("{} -> {}", c.tag, render_block(c.target)))
                .collect();
            format!(
                "switch_tag {} {{ {}, default -> {} }}",
                render_operand(value, module),
                rendered.join(", "),
                render_block(*default)
            )
        }
        Terminator::Unreachable => "unreachable".to_string(),
    }
}
