use std::sync::Arc;

use psgraph_core::{
    AttrValue, LrScheduler, OpDesc, OpRole, Program, PsRoleMaker, PS_SUPPORTED_SCHEDULERS,
};
use psgraph_passes::{
    default_server_passes, registry, AddListenAndServPass, AddLrDecayTablePass, Pass, PassContext,
    PassError, PassPipeline, PassRegistry, PipelineConfig, PsMode, GLOBAL_STEP_TABLE_CLASS,
    LISTEN_AND_SERV_OP, LR_DECAY_COUNTER,
};

fn trainer_program(scheduler: Option<LrScheduler>) -> Program {
    let mut program = Program::new();
    let block = program.global_block_mut();
    block.append_op(
        OpDesc::new("mul")
            .with_input("X", ["x"])
            .with_input("Y", ["fc_0.w_0"])
            .with_output("Out", ["fc_0.tmp_0"])
            .with_role(OpRole::Forward),
    );
    block.append_op(
        OpDesc::new("sgd")
            .with_input("Param", ["fc_0.w_0"])
            .with_input("Grad", ["fc_0.w_0@GRAD"])
            .with_output("ParamOut", ["fc_0.w_0"])
            .with_role(OpRole::Optimize),
    );
    program.set_lr_scheduler(scheduler);
    program
}

fn server_role() -> Arc<PsRoleMaker> {
    let endpoints = vec![
        "10.0.0.1:6170".to_string(),
        "10.0.0.2:6170".to_string(),
        "10.0.0.3:6170".to_string(),
    ];
    Arc::new(PsRoleMaker::new(endpoints, 2, 8).unwrap())
}

#[test]
fn every_supported_scheduler_yields_one_global_step_table() {
    let schedulers = [
        LrScheduler::exponential(0.5),
        LrScheduler::noam(512, 4000),
        LrScheduler::natural_exp(0.3),
        LrScheduler::inverse_time(0.1),
    ];
    for scheduler in schedulers {
        let name = scheduler.name();
        let mut ctx = PassContext::new()
            .with_origin_main_program(trainer_program(Some(scheduler)))
            .with_lr_decay_steps(100);
        AddLrDecayTablePass
            .apply(&mut Program::new(), &mut Program::new(), &mut ctx)
            .unwrap();

        assert_eq!(ctx.tensor_table().len(), 1, "{name}");
        let entry = &ctx.tensor_table()[LR_DECAY_COUNTER];
        assert_eq!(entry.tensor_table_class, GLOBAL_STEP_TABLE_CLASS, "{name}");
        assert!(!entry.fetch_var_name.is_empty(), "{name}");
        assert!(
            entry.main_program.global_block().has_var(&entry.fetch_var_name),
            "{name}"
        );
        assert!(
            entry.startup_program.global_block().has_var(LR_DECAY_COUNTER),
            "{name}"
        );
    }
}

#[test]
fn no_scheduler_leaves_context_untouched() {
    let mut ctx = PassContext::new().with_origin_main_program(trainer_program(None));
    let mut main = Program::new();
    AddLrDecayTablePass
        .apply(&mut main, &mut Program::new(), &mut ctx)
        .unwrap();
    assert!(ctx.tensor_table().is_empty());
    assert!(ctx.extra_attrs().is_empty());
    assert_eq!(main.op_count(), 0);
}

#[test]
fn unsupported_scheduler_fails_listing_supported_variants() {
    let scheduler = LrScheduler::CosineAnnealingDecay {
        learning_rate: 0.1,
        t_max: 10,
        eta_min: 0.0,
    };
    let mut ctx = PassContext::new()
        .with_origin_main_program(trainer_program(Some(scheduler)))
        .with_lr_decay_steps(100);
    let err = AddLrDecayTablePass
        .apply(&mut Program::new(), &mut Program::new(), &mut ctx)
        .unwrap_err();

    match &err {
        PassError::UnsupportedScheduler { name, supported } => {
            assert_eq!(name, "CosineAnnealingDecay");
            assert_eq!(supported.len(), 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    let msg = err.to_string();
    for name in PS_SUPPORTED_SCHEDULERS {
        assert!(msg.contains(name));
    }
    assert!(ctx.tensor_table().is_empty());
}

#[test]
fn exponential_decay_scenario() {
    let mut ctx = PassContext::new()
        .with_origin_main_program(trainer_program(Some(LrScheduler::exponential(0.5))))
        .with_lr_decay_steps(100);
    AddLrDecayTablePass
        .apply(&mut Program::new(), &mut Program::new(), &mut ctx)
        .unwrap();

    let entry = &ctx.tensor_table()[LR_DECAY_COUNTER];
    let decay = entry
        .main_program
        .global_block()
        .ops_of_type("exponential_decay")
        .next()
        .unwrap();
    assert_eq!(decay.attr("decay_steps"), Some(&AttrValue::Int(100)));
    assert_eq!(decay.attr("decay_rate"), Some(&AttrValue::Float(0.5)));
    assert_eq!(decay.attr("staircase"), Some(&AttrValue::Bool(true)));
    assert_eq!(decay.attr("base_lr"), Some(&AttrValue::Float(1.0)));
    assert_eq!(decay.output("Out"), [entry.fetch_var_name.clone()]);
}

#[test]
fn listen_and_serv_reflects_role_maker() {
    let role = server_role();
    let mut ctx = PassContext::new()
        .with_role_maker(role.clone())
        .with_ps_mode(PsMode::Sync);
    let mut main = trainer_program(None);
    let before = main.op_count();

    AddListenAndServPass
        .apply(&mut main, &mut Program::new(), &mut ctx)
        .unwrap();

    assert_eq!(main.op_count(), before + 1);
    let serv: Vec<_> = main.global_block().ops_of_type(LISTEN_AND_SERV_OP).collect();
    assert_eq!(serv.len(), 1);
    assert_eq!(serv[0].attr("Fanin"), Some(&AttrValue::Int(8)));
    assert_eq!(serv[0].attr("pserver_id"), Some(&AttrValue::Int(2)));
    assert_eq!(
        serv[0].attr("endpoint").and_then(AttrValue::as_str),
        Some("10.0.0.3:6170")
    );
    assert_eq!(serv[0].attr("distributed_mode"), Some(&AttrValue::Int(0)));
}

#[test]
fn listen_and_serv_is_not_idempotent() {
    let mut ctx = PassContext::new()
        .with_role_maker(server_role())
        .with_ps_mode(PsMode::Async);
    let mut main = Program::new();
    let mut startup = Program::new();
    AddListenAndServPass.apply(&mut main, &mut startup, &mut ctx).unwrap();
    AddListenAndServPass.apply(&mut main, &mut startup, &mut ctx).unwrap();
    assert_eq!(main.global_block().ops_of_type(LISTEN_AND_SERV_OP).count(), 2);
}

#[test]
fn placeholder_passes_change_nothing() {
    let registry = registry::global().unwrap();
    let mut ctx = PassContext::new().with_ps_mode(PsMode::Geo);
    ctx.set_attr("marker", 7_i64);
    let extra_before = ctx.extra_attrs().clone();

    for name in [
        "add_rpc_global_flags_pass",
        "add_optimizer_pass",
        "add_geo_optimizer_pass",
        "build_pserver_startup_program_pass",
        "delete_unused_in_startup_pass",
    ] {
        let pass = registry.create(name).unwrap();
        assert!(pass.check_self());
        let mut main = trainer_program(None);
        let mut startup = trainer_program(None);
        pass.apply(&mut main, &mut startup, &mut ctx).unwrap();
        assert_eq!(main.op_count(), 2, "{name}");
        assert_eq!(startup.op_count(), 2, "{name}");
        assert_eq!(ctx.extra_attrs(), &extra_before, "{name}");
        assert!(ctx.tensor_table().is_empty(), "{name}");
    }
}

#[test]
fn registry_rejects_duplicates_and_unknown_names() {
    let mut registry = PassRegistry::with_builtin_passes().unwrap();
    assert!(matches!(
        registry.register_default::<AddListenAndServPass>(),
        Err(PassError::DuplicateName { .. })
    ));
    assert!(matches!(
        registry.create("add_trainer_pass"),
        Err(PassError::UnknownPass { .. })
    ));
}

#[test]
fn default_pipeline_builds_server_program() {
    let config = PipelineConfig::from_json_str(
        r#"{
            "ps_mode": "half_async",
            "lr_decay_steps": 20,
            "role": {"pserver_endpoints": ["10.0.0.1:6170"], "role_id": 0, "trainer_num": 3}
        }"#,
    )
    .unwrap();
    let origin = trainer_program(Some(LrScheduler::inverse_time(0.1)));
    let mut ctx = config.build_context(origin, Program::new());

    let names = config.pass_names();
    assert_eq!(names, default_server_passes(PsMode::HalfAsync));
    let pipeline = PassPipeline::from_names(registry::global().unwrap(), &names).unwrap();

    let mut main = Program::new();
    let mut startup = Program::new();
    let runs = pipeline.run(&mut main, &mut startup, &mut ctx).unwrap();

    assert_eq!(runs.len(), 6);
    assert_eq!(ctx.applied_passes(), pipeline.names());
    assert_eq!(main.global_block().ops.len(), 1);
    assert_eq!(main.global_block().ops[0].op_type, LISTEN_AND_SERV_OP);
    assert_eq!(
        main.global_block().ops[0].attr("distributed_mode"),
        Some(&AttrValue::Int(2))
    );
    assert!(ctx.tensor_table().contains_key(LR_DECAY_COUNTER));
}

#[test]
fn pipeline_without_role_maker_fails_before_mutation() {
    let config = PipelineConfig::default();
    let mut ctx = config.build_context(trainer_program(None), Program::new());
    let registry = registry::global().unwrap();
    let pipeline = PassPipeline::from_names(registry, &config.pass_names()).unwrap();

    let mut main = Program::new();
    let err = pipeline
        .run(&mut main, &mut Program::new(), &mut ctx)
        .unwrap_err();
    assert!(matches!(err, PassError::MissingAttribute { ref key } if key == "role_maker"));
    assert_eq!(main.op_count(), 0);
    assert!(ctx.applied_passes().is_empty());
}
