//! surgec-drv - Middle-end driver.
//!
//! Orchestrates the normative pass order on a monomorphized HIR module:
//!
//! 1. `lower_module`: HIR to MIR
//! 2. per function: `simplify_cfg`, `recognize_switch_tag`, `simplify_cfg`
//! 3. `lower_async_state_machine`
//! 4. `validate` (all diagnostics reported, then compilation aborts)
//! 5. optional MIR dump behind `--emit-mir`
//!
//! Modules are independent; [`compile_modules`] fans out across them with
//! rayon. Within one module every pass is single-threaded by design.
//!
//! Exit codes: 0 success, 1 compilation error, 3 command-line error.

use anyhow::{anyhow, bail, Context, Result};
use rayon::prelude::*;
use std::time::Instant;
use surgec_mir::{
    dump_module, lower_async_state_machine, lower_module, recognize_switch_tag, simplify_cfg,
    validate, Module,
};
use surgec_sem::hir::HirModule;
use surgec_sem::SemResult;

/// Driver configuration, parsed by hand from the command line.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Print the deterministic MIR dump after a successful pipeline.
    pub emit_mir: bool,
    /// Print per-pass timing lines to stderr.
    pub verbose: bool,
}

impl Config {
    /// Parse command-line arguments (without the program name).
    pub fn parse(args: &[String]) -> Result<Config> {
        let mut config = Config::default();
        for arg in args {
            match arg.as_str() {
                "--emit-mir" => config.emit_mir = true,
                "--verbose" | "-v" => config.verbose = true,
                "--help" | "-h" => {
                    println!("usage: surgec [--emit-mir] [--verbose]");
                    std::process::exit(0);
                }
                other => bail!("unknown option `{}`", other),
            }
        }
        Ok(config)
    }
}

struct PassTimer<'a> {
    config: &'a Config,
    start: Instant,
}

impl<'a> PassTimer<'a> {
    fn start(config: &'a Config) -> Self {
        Self {
            config,
            start: Instant::now(),
        }
    }

    fn mark(&mut self, pass: &str) {
        if self.config.verbose {
            eprintln!("[surgec] {:<24} {:?}", pass, self.start.elapsed());
        }
        self.start = Instant::now();
    }
}

/// Run the full pass pipeline on one module.
pub fn run_pipeline(hir: &HirModule, sem: &mut SemResult, config: &Config) -> Result<Module> {
    let mut timer = PassTimer::start(config);

    let mut module = lower_module(hir, sem)
        .map_err(|e| anyhow!(e))
        .context("lowering HIR to MIR")?;
    timer.mark("lower");

    for func in module.funcs.iter_mut() {
        simplify_cfg(func);
        recognize_switch_tag(func);
        simplify_cfg(func);
    }
    timer.mark("simplify+switch");

    lower_async_state_machine(&mut module, sem)
        .map_err(|e| anyhow!(e))
        .context("async state-machine lowering")?;
    timer.mark("async");

    if let Err(errors) = validate(&module, &sem.types) {
        for error in &errors {
            eprintln!("error: {}", error);
        }
        bail!("MIR validation failed with {} diagnostic(s)", errors.len());
    }
    timer.mark("validate");

    if config.emit_mir {
        print!("{}", dump_module(&module, &sem.types));
    }

    Ok(module)
}

/// Compile several independent modules in parallel. Each module owns its
/// semantic tables, so no synchronization is needed across the fan-out.
pub fn compile_modules(
    inputs: Vec<(HirModule, SemResult)>,
    config: &Config,
) -> Vec<Result<Module>> {
    inputs
        .into_par_iter()
        .map(|(hir, mut sem)| run_pipeline(&hir, &mut sem, config))
        .collect()
}

/// A small built-in program used by the CLI when no front-end is attached:
/// exercises branching, a union compare, and an async await so the emitted
/// MIR shows every pipeline stage.
pub fn demo_program() -> (HirModule, SemResult) {
    use surgec_sem::hir::*;
    use surgec_util::{Span, Symbol};

    let mut sem = SemResult::new();
    let int = sem.types.builtins().int;
    let bool_ty = sem.types.builtins().bool_;
    let task_int = sem.types.task_of(int);

    // fn checkpoint() -> Task<int>  (runtime-provided stub)
    let checkpoint_sym = sem.symbols.fresh_synthetic("checkpoint");
    let checkpoint = HirFunc {
        sym: checkpoint_sym,
        name: Symbol::intern("checkpoint"),
        span: Span::DUMMY,
        params: Vec::new(),
        result: task_int,
        is_async: false,
        failfast: false,
        body: Vec::new(),
    };

    // async fn step(x: int) -> int { let v = checkpoint().await; return v + x; }
    let x = sem.symbols.fresh_synthetic("x");
    let v = sem.symbols.fresh_synthetic("v");
    let step_sym = sem.symbols.fresh_synthetic("step");
    let step = HirFunc {
        sym: step_sym,
        name: Symbol::intern("step"),
        span: Span::DUMMY,
        params: vec![HirParam {
            sym: x,
            name: Symbol::intern("x"),
            ty: int,
            default: Some(HirExpr::Literal {
                lit: HirLit::Int { value: 1, text: None },
                ty: int,
                span: Span::DUMMY,
            }),
            span: Span::DUMMY,
        }],
        result: int,
        is_async: true,
        failfast: true,
        body: vec![
            HirStmt::Let {
                sym: v,
                name: Symbol::intern("v"),
                ty: int,
                init: Some(HirExpr::Await {
                    task: Box::new(HirExpr::Call {
                        callee: HirCallee::Fn {
                            sym: checkpoint_sym,
                            name: Symbol::intern("checkpoint"),
                            type_args: Vec::new(),
                        },
                        args: Vec::new(),
                        ty: task_int,
                        span: Span::DUMMY,
                    }),
                    ty: int,
                    span: Span::DUMMY,
                }),
                span: Span::DUMMY,
            },
            HirStmt::Return {
                value: Some(HirExpr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(HirExpr::Var {
                        sym: v,
                        name: Symbol::intern("v"),
                        ty: int,
                        span: Span::DUMMY,
                    }),
                    rhs: Box::new(HirExpr::Var {
                        sym: x,
                        name: Symbol::intern("x"),
                        ty: int,
                        span: Span::DUMMY,
                    }),
                    ty: int,
                    span: Span::DUMMY,
                }),
                span: Span::DUMMY,
            },
        ],
    };

    // @entrypoint fn main() -> int { if 1 > 0 { return 1 } else { return 0 } }
    let main_sym = sem.symbols.fresh_synthetic("main");
    let main = HirFunc {
        sym: main_sym,
        name: Symbol::intern("main"),
        span: Span::DUMMY,
        params: Vec::new(),
        result: int,
        is_async: false,
        failfast: false,
        body: vec![HirStmt::If {
            cond: HirExpr::Binary {
                op: BinOp::Gt,
                lhs: Box::new(HirExpr::Literal {
                    lit: HirLit::Int { value: 1, text: None },
                    ty: int,
                    span: Span::DUMMY,
                }),
                rhs: Box::new(HirExpr::Literal {
                    lit: HirLit::Int { value: 0, text: None },
                    ty: int,
                    span: Span::DUMMY,
                }),
                ty: bool_ty,
                span: Span::DUMMY,
            },
            then_body: vec![HirStmt::Return {
                value: Some(HirExpr::Literal {
                    lit: HirLit::Int { value: 1, text: None },
                    ty: int,
                    span: Span::DUMMY,
                }),
                span: Span::DUMMY,
            }],
            else_body: vec![HirStmt::Return {
                value: Some(HirExpr::Literal {
                    lit: HirLit::Int { value: 0, text: None },
                    ty: int,
                    span: Span::DUMMY,
                }),
                span: Span::DUMMY,
            }],
            span: Span::DUMMY,
        }],
    };

    let hir = HirModule {
        funcs: vec![checkpoint, step, main],
        globals: Vec::new(),
        consts: Vec::new(),
        entry: Some(EntryPoint {
            sym: main_sym,
            mode: EntryMode::None,
        }),
    };
    (hir, sem)
}
