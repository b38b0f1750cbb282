//! Learning-rate decay sub-programs for the parameter-server step table.
//!
//! Each builder returns a fresh `(main, startup)` program pair computing a
//! decayed learning rate from a global step counter named
//! [`LR_DECAY_COUNTER`]. The startup program initialises the counter; the
//! main program increments it, casts it to float and feeds one decay op
//! whose output is the decayed value.

use psgraph_core::{
    DataType, LrScheduler, OpDesc, OpRole, Program, VarDesc, PS_SUPPORTED_SCHEDULERS,
};
use tracing::warn;

use crate::context::LR_DECAY_COUNTER;
use crate::error::{PassError, Result};

/// Base rate handed to every decay formula; the server scales it by the live LR.
pub const PLACEHOLDER_BASE_LR: f64 = 1.0;

/// A decay program pair and the name of its decayed-LR output.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayProgram {
    pub main_program: Program,
    pub startup_program: Program,
    pub lr_name: String,
}

/// Declares the step counter in both programs and returns the float step value.
///
/// The counter starts at `begin - 1` and is incremented before each use, so
/// the first observed step is `begin`.
fn decay_step_counter(main: &mut Program, startup: &mut Program, begin: i64) -> String {
    let counter = || VarDesc::new(LR_DECAY_COUNTER, DataType::Int64, vec![1]).persistable(true);

    let startup_block = startup.global_block_mut();
    startup_block.create_var(counter());
    startup_block.append_op(
        OpDesc::new("fill_constant")
            .with_output("Out", [LR_DECAY_COUNTER])
            .with_attr("value", (begin - 1) as f64)
            .with_attr("dtype", "int64")
            .with_attr("shape", vec![1_i64])
            .with_role(OpRole::LrSched),
    );

    main.global_block_mut().create_var(counter());
    main.global_block_mut().prepend_op(
        OpDesc::new("increment")
            .with_input("X", [LR_DECAY_COUNTER])
            .with_output("Out", [LR_DECAY_COUNTER])
            .with_attr("step", 1.0)
            .with_role(OpRole::LrSched),
    );

    let step = main.unique_name("cast");
    let block = main.global_block_mut();
    block.create_var(VarDesc::new(step.clone(), DataType::Float32, vec![1]));
    block.append_op(
        OpDesc::new("cast")
            .with_input("X", [LR_DECAY_COUNTER])
            .with_output("Out", [step.clone()])
            .with_attr("in_dtype", "int64")
            .with_attr("out_dtype", "float32")
            .with_role(OpRole::LrSched),
    );
    step
}

/// Appends a decay op reading `step` and returns its output name.
fn append_decay_op(main: &mut Program, op_type: &str, step: &str, op: OpDesc) -> String {
    let lr_name = main.unique_name(op_type);
    let block = main.global_block_mut();
    block.create_var(VarDesc::new(lr_name.clone(), DataType::Float32, vec![1]));
    block.append_op(
        op.with_input("Step", [step])
            .with_output("Out", [lr_name.clone()])
            .with_role(OpRole::LrSched),
    );
    lr_name
}

fn step_decay(
    op_type: &str,
    base_lr: f64,
    decay_steps: i64,
    decay_rate: f64,
    staircase: bool,
) -> DecayProgram {
    let mut main_program = Program::new();
    let mut startup_program = Program::new();
    let step = decay_step_counter(&mut main_program, &mut startup_program, 0);
    let op = OpDesc::new(op_type)
        .with_attr("base_lr", base_lr)
        .with_attr("decay_steps", decay_steps)
        .with_attr("decay_rate", decay_rate)
        .with_attr("staircase", staircase);
    let lr_name = append_decay_op(&mut main_program, op_type, &step, op);
    DecayProgram {
        main_program,
        startup_program,
        lr_name,
    }
}

/// `base_lr * decay_rate ^ (step / decay_steps)`.
pub fn exponential_decay(
    base_lr: f64,
    decay_steps: i64,
    decay_rate: f64,
    staircase: bool,
) -> DecayProgram {
    step_decay("exponential_decay", base_lr, decay_steps, decay_rate, staircase)
}

/// `base_lr * exp(-decay_rate * step / decay_steps)`.
pub fn natural_exp_decay(
    base_lr: f64,
    decay_steps: i64,
    decay_rate: f64,
    staircase: bool,
) -> DecayProgram {
    step_decay("natural_exp_decay", base_lr, decay_steps, decay_rate, staircase)
}

/// `base_lr / (1 + decay_rate * step / decay_steps)`.
pub fn inverse_time_decay(
    base_lr: f64,
    decay_steps: i64,
    decay_rate: f64,
    staircase: bool,
) -> DecayProgram {
    step_decay("inverse_time_decay", base_lr, decay_steps, decay_rate, staircase)
}

/// Noam warmup schedule. The counter starts at 1 so the first step is never zero.
pub fn noam_decay(d_model: i64, warmup_steps: i64, base_lr: f64) -> DecayProgram {
    let mut main_program = Program::new();
    let mut startup_program = Program::new();
    let step = decay_step_counter(&mut main_program, &mut startup_program, 1);
    let op = OpDesc::new("noam_decay")
        .with_attr("base_lr", base_lr)
        .with_attr("d_model", d_model)
        .with_attr("warmup_steps", warmup_steps);
    let lr_name = append_decay_op(&mut main_program, "noam_decay", &step, op);
    DecayProgram {
        main_program,
        startup_program,
        lr_name,
    }
}

fn warn_decay_steps(scheduler: &str, lr_decay_steps: i64) {
    warn!(
        scheduler,
        lr_decay_steps,
        "{scheduler} is set, staircase = true, \
         global learning rate decay step is [ {lr_decay_steps} ]. \
         Change decay steps with DistributedStrategy: a_sync = true, \
         a_sync_configs = {{ 'lr_decay_steps': YOUR_DECAY_STEP }}"
    );
}

/// Builds the decay program for a program-declared scheduler.
///
/// Formulas always receive [`PLACEHOLDER_BASE_LR`]; the step-decay forms use
/// `lr_decay_steps` with staircase semantics. Schedulers outside
/// [`PS_SUPPORTED_SCHEDULERS`] are rejected.
pub fn lr_scheduler_program(scheduler: &LrScheduler, lr_decay_steps: i64) -> Result<DecayProgram> {
    let program = match scheduler {
        LrScheduler::ExponentialDecay { gamma, .. } => {
            let program = exponential_decay(PLACEHOLDER_BASE_LR, lr_decay_steps, *gamma, true);
            warn_decay_steps(scheduler.name(), lr_decay_steps);
            program
        }
        LrScheduler::NoamDecay {
            d_model,
            warmup_steps,
            ..
        } => {
            let program = noam_decay(*d_model, *warmup_steps, PLACEHOLDER_BASE_LR);
            warn!(
                warmup_steps = *warmup_steps,
                "NoamDecay is set, warmup steps is [ {} ]", warmup_steps
            );
            program
        }
        LrScheduler::NaturalExpDecay { gamma, .. } => {
            let program = natural_exp_decay(PLACEHOLDER_BASE_LR, lr_decay_steps, *gamma, true);
            warn_decay_steps(scheduler.name(), lr_decay_steps);
            program
        }
        LrScheduler::InverseTimeDecay { gamma, .. } => {
            let program = inverse_time_decay(PLACEHOLDER_BASE_LR, lr_decay_steps, *gamma, true);
            warn_decay_steps(scheduler.name(), lr_decay_steps);
            program
        }
        LrScheduler::PiecewiseDecay { .. }
        | LrScheduler::PolynomialDecay { .. }
        | LrScheduler::StepDecay { .. }
        | LrScheduler::CosineAnnealingDecay { .. } => {
            return Err(PassError::UnsupportedScheduler {
                name: scheduler.name().to_string(),
                supported: PS_SUPPORTED_SCHEDULERS.iter().map(|s| s.to_string()).collect(),
            });
        }
    };
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use psgraph_core::AttrValue;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// Runs `f` with a subscriber that records formatted events.
    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, logs.text())
    }

    fn decay_op<'a>(program: &'a DecayProgram, op_type: &str) -> &'a OpDesc {
        program
            .main_program
            .global_block()
            .ops_of_type(op_type)
            .next()
            .expect("decay op present")
    }

    #[test]
    fn test_exponential_decay_program_shape() {
        let program = exponential_decay(1.0, 100, 0.5, true);

        let types: Vec<_> = program
            .main_program
            .global_block()
            .ops
            .iter()
            .map(|op| op.op_type.as_str())
            .collect();
        assert_eq!(types, vec!["increment", "cast", "exponential_decay"]);

        let op = decay_op(&program, "exponential_decay");
        assert_eq!(op.attr("decay_steps"), Some(&AttrValue::Int(100)));
        assert_eq!(op.attr("decay_rate"), Some(&AttrValue::Float(0.5)));
        assert_eq!(op.attr("staircase"), Some(&AttrValue::Bool(true)));
        assert_eq!(op.attr("base_lr"), Some(&AttrValue::Float(1.0)));
        assert_eq!(op.output("Out"), [program.lr_name.clone()]);
        assert_eq!(op.role(), Some(OpRole::LrSched));
        assert_eq!(program.lr_name, "exponential_decay_0.tmp_0");
        assert!(program.main_program.global_block().has_var(&program.lr_name));
    }

    #[test]
    fn test_step_counter_startup_init() {
        let program = inverse_time_decay(1.0, 10, 0.1, true);
        let startup = program.startup_program.global_block();
        assert_eq!(startup.ops.len(), 1);
        let fill = &startup.ops[0];
        assert_eq!(fill.op_type, "fill_constant");
        assert_eq!(fill.output("Out"), [LR_DECAY_COUNTER.to_string()]);
        assert_eq!(fill.attr("value"), Some(&AttrValue::Float(-1.0)));
        assert!(startup.var(LR_DECAY_COUNTER).unwrap().persistable);

        let cast = decay_op(&program, "cast");
        let decay = decay_op(&program, "inverse_time_decay");
        assert_eq!(decay.input("Step"), cast.output("Out"));
    }

    #[test]
    fn test_noam_counter_begins_at_one() {
        let program = noam_decay(512, 4000, 1.0);
        let fill = &program.startup_program.global_block().ops[0];
        assert_eq!(fill.attr("value"), Some(&AttrValue::Float(0.0)));

        let op = decay_op(&program, "noam_decay");
        assert_eq!(op.attr("d_model"), Some(&AttrValue::Int(512)));
        assert_eq!(op.attr("warmup_steps"), Some(&AttrValue::Int(4000)));
        assert_eq!(op.attr("base_lr"), Some(&AttrValue::Float(1.0)));
        assert!(!op.has_attr("decay_steps"));
    }

    #[test]
    fn test_scheduler_dispatch_forces_placeholder_and_staircase() {
        let sched = LrScheduler::NaturalExpDecay {
            learning_rate: 0.01,
            gamma: 0.2,
        };
        let program = lr_scheduler_program(&sched, 50).unwrap();
        let op = decay_op(&program, "natural_exp_decay");
        assert_eq!(op.attr("base_lr"), Some(&AttrValue::Float(PLACEHOLDER_BASE_LR)));
        assert_eq!(op.attr("decay_steps"), Some(&AttrValue::Int(50)));
        assert_eq!(op.attr("decay_rate"), Some(&AttrValue::Float(0.2)));
        assert_eq!(op.attr("staircase"), Some(&AttrValue::Bool(true)));
    }

    #[test]
    fn test_step_decay_warns_with_decay_steps() {
        let (program, logs) =
            capture_logs(|| lr_scheduler_program(&LrScheduler::exponential(0.5), 100));
        assert!(program.is_ok());
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("ExponentialDecay is set, staircase = true"), "{logs}");
        assert!(
            logs.contains("global learning rate decay step is [ 100 ]"),
            "{logs}"
        );
        assert!(logs.contains("'lr_decay_steps': YOUR_DECAY_STEP"), "{logs}");
    }

    #[test]
    fn test_noam_warns_with_warmup_steps() {
        let (program, logs) =
            capture_logs(|| lr_scheduler_program(&LrScheduler::noam(512, 4000), 100));
        assert!(program.is_ok());
        assert!(logs.contains("NoamDecay is set, warmup steps is [ 4000 ]"), "{logs}");
        assert!(!logs.contains("decay step is"), "{logs}");
    }

    #[test]
    fn test_unsupported_scheduler_does_not_warn() {
        let sched = LrScheduler::StepDecay {
            learning_rate: 0.1,
            step_size: 10,
            gamma: 0.5,
        };
        let (result, logs) = capture_logs(|| lr_scheduler_program(&sched, 10));
        assert!(result.is_err());
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn test_unsupported_scheduler_lists_supported_names() {
        let sched = LrScheduler::PolynomialDecay {
            learning_rate: 0.1,
            decay_steps: 10,
            end_lr: 0.0,
            power: 1.0,
            cycle: false,
        };
        let err = lr_scheduler_program(&sched, 10).unwrap_err();
        let msg = err.to_string();
        for name in PS_SUPPORTED_SCHEDULERS {
            assert!(msg.contains(name), "{msg} should mention {name}");
        }
        assert!(msg.contains("PolynomialDecay"));
    }
}
