use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_yaml::Value;

use super::*;
use crate::application::ports::output::{
    MockCloudFormation, MockConfirmationPort, MockModelResolver, MockSessionProvider,
};
use crate::application::ports::{ProviderError, StackDescription, StackOutput, SubmitOutcome};
use crate::domain::{
    GroupState, HookContext, HookMethod, HookTiming, ParameterMode, StackAction, StackStatus,
    StackTemplate,
};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Clone, Default)]
struct MapFs(Arc<Mutex<HashMap<PathBuf, String>>>);

impl MapFs {
    fn get(&self, path: &Path) -> Option<String> {
        self.0.lock().unwrap().get(path).cloned()
    }

    fn put(&self, path: &Path, content: &str) {
        self.0
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
    }
}

impl Filesystem for MapFs {
    fn read_to_string(&self, path: &Path) -> StrataResult<Option<String>> {
        Ok(self.get(path))
    }

    fn write_file(&self, path: &Path, content: &str) -> StrataResult<()> {
        self.put(path, content);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.0.lock().unwrap().contains_key(path)
    }

    fn remove_file(&self, path: &Path) -> StrataResult<bool> {
        Ok(self.0.lock().unwrap().remove(path).is_some())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> StrataResult<()> {
        let content = self.get(from).unwrap_or_default();
        self.put(to, &content);
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> StrataResult<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Lines(Arc<Mutex<Vec<String>>>);

impl Lines {
    fn any(&self, needle: &str) -> bool {
        self.0.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl Reporter for Lines {
    fn emit(&self, line: &str) {
        self.0.lock().unwrap().push(line.to_string());
    }
}

/// Shared provider state behind every mock client the sessions hand out.
#[derive(Clone, Default)]
struct Provider {
    status: Arc<Mutex<Option<StackStatus>>>,
    outputs: Arc<Mutex<Vec<StackOutput>>>,
    calls: Arc<Mutex<Vec<String>>>,
    expire_once: Arc<AtomicBool>,
    throttle_once: Arc<AtomicBool>,
}

impl Provider {
    fn with_status(status: StackStatus) -> Self {
        let provider = Self::default();
        *provider.status.lock().unwrap() = Some(status);
        provider
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c == name)
    }

    fn mock(&self) -> MockCloudFormation {
        let mut cf = MockCloudFormation::new();

        let p = self.clone();
        cf.expect_describe_stack().returning(move |name| {
            p.record("describe");
            if p.expire_once.swap(false, Ordering::SeqCst) {
                return Err(ProviderError::expired_token());
            }
            if p.throttle_once.swap(false, Ordering::SeqCst) {
                return Err(ProviderError::rate_exceeded());
            }
            match *p.status.lock().unwrap() {
                Some(status) => Ok(StackDescription {
                    stack_id: format!("arn:{name}"),
                    status,
                    termination_protection: false,
                    outputs: Some(p.outputs.lock().unwrap().clone()),
                }),
                None => Err(ProviderError::does_not_exist(name)),
            }
        });
        cf.expect_describe_stack_events()
            .returning(|_| Ok(Vec::new()));

        let p = self.clone();
        cf.expect_validate_template().returning(move |_| {
            p.record("validate");
            Ok(())
        });

        let p = self.clone();
        cf.expect_create_stack().returning(move |input| {
            p.record("create");
            *p.status.lock().unwrap() = Some(StackStatus::CreateComplete);
            SubmitOutcome::Submitted(format!("arn:{}", input.stack_name))
        });

        let p = self.clone();
        cf.expect_update_stack().returning(move |_| {
            p.record("update");
            SubmitOutcome::NoChange
        });

        let p = self.clone();
        cf.expect_delete_stack().returning(move |_| {
            p.record("delete");
            *p.status.lock().unwrap() = None;
            Ok(())
        });

        let p = self.clone();
        cf.expect_update_termination_protection()
            .returning(move |_, enabled| {
                p.record(if enabled { "protect" } else { "unprotect" });
                Ok(())
            });

        cf.expect_wait().returning(|_, _| Ok(()));
        cf
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

struct Harness {
    fs: MapFs,
    lines: Lines,
    provider: Provider,
    forced: Arc<Mutex<Vec<bool>>>,
}

impl Harness {
    fn new(provider: Provider) -> Self {
        Self {
            fs: MapFs::default(),
            lines: Lines::default(),
            provider,
            forced: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn options() -> EngineOptions {
        EngineOptions {
            home: PathBuf::from("/p"),
            throttle_delay: Duration::ZERO,
            ..EngineOptions::default()
        }
    }

    fn engine(&self, answer: bool) -> Engine {
        self.engine_with(Self::options(), answer, empty_model())
    }

    fn engine_with(&self, options: EngineOptions, answer: bool, model: MockModelResolver) -> Engine {
        let mut sessions = MockSessionProvider::new();
        let provider = self.provider.clone();
        let forced = Arc::clone(&self.forced);
        sessions.expect_client().returning(move |_, _, force| {
            forced.lock().unwrap().push(force);
            Ok(Arc::new(provider.mock()) as Arc<dyn CloudFormation>)
        });

        let mut confirm = MockConfirmationPort::new();
        confirm.expect_confirm().returning(move |_, _| Ok(answer));

        Engine::new(
            options,
            Box::new(self.fs.clone()),
            Box::new(sessions),
            Box::new(confirm),
            Box::new(self.lines.clone()),
            Box::new(model),
        )
    }
}

fn empty_model() -> MockModelResolver {
    let mut model = MockModelResolver::new();
    model.expect_resolve().returning(|_| Ok(None));
    model
}

const VPC_BODY: &str = "Resources:\n  Vpc:\n    Type: AWS::EC2::VPC\n";

fn vpc_stack(body: &str) -> NewStack {
    NewStack::new(
        "netenv.ne.dev.vpc",
        "dev",
        "us-west-2",
        StackTemplate::new("vpc", "netenv.ne.dev.vpc").with_body(body),
    )
}

fn add_vpc(engine: &mut Engine, body: &str) -> (GroupId, StackId) {
    let group = engine.add_group("net", "ne-dev", "", None).unwrap();
    let stack = engine.add_stack(group, vpc_stack(body)).unwrap();
    (group, stack)
}

fn paths(engine: &Engine, stack: StackId) -> (PathBuf, PathBuf, PathBuf) {
    let s = engine.stack(stack).unwrap();
    let stem = s.file_stem();
    let layout = engine.layout();
    (
        layout.build_template(&s.account, &s.region, &stem),
        layout.cache_file(&s.account, &s.region, &stem),
        layout.applied_template(&s.account, &s.region, &stem),
    )
}

// ============================================================================
// Provision
// ============================================================================

#[test]
fn provision_creates_missing_stack_and_records_applied_state() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    let (_, stack) = add_vpc(&mut engine, VPC_BODY);

    engine.provision().unwrap();

    let (build, cache, applied) = paths(&engine, stack);
    assert_eq!(h.fs.get(&build).as_deref(), Some(VPC_BODY));
    assert_eq!(h.fs.get(&applied).as_deref(), Some(VPC_BODY));
    assert!(h.fs.get(&cache).is_some_and(|id| id.len() == 32));
    assert!(h.provider.called("create"));
    assert!(h.provider.called("protect"));
    assert!(h.lines.any("ne-dev-vpc"));
    assert!(h.lines.any("Create"));
    assert_eq!(
        engine.stack(stack).unwrap().action,
        Some(StackAction::Create)
    );
}

#[test]
fn unchanged_stack_is_served_from_cache() {
    let h = Harness::new(Provider::default());
    let mut first = h.engine(true);
    add_vpc(&mut first, VPC_BODY);
    first.provision().unwrap();
    h.provider.calls.lock().unwrap().clear();

    let mut second = h.engine(true);
    let (_, stack) = add_vpc(&mut second, VPC_BODY);
    second.provision().unwrap();

    assert!(second.stack(stack).unwrap().cached);
    assert!(h.provider.calls().is_empty());
    assert!(h.lines.any("Cache"));
}

#[test]
fn nocache_forces_update_of_existing_stack() {
    let h = Harness::new(Provider::default());
    let mut first = h.engine(true);
    add_vpc(&mut first, VPC_BODY);
    first.provision().unwrap();

    let options = EngineOptions {
        nocache: true,
        ..Harness::options()
    };
    let mut second = h.engine_with(options, true, empty_model());
    add_vpc(&mut second, VPC_BODY);
    second.provision().unwrap();

    assert!(h.provider.called("update"));
}

#[test]
fn existing_stack_without_changes_is_marked_done() {
    let h = Harness::new(Provider::with_status(StackStatus::CreateComplete));
    let mut engine = h.engine(true);
    let (_, stack) = add_vpc(&mut engine, VPC_BODY);

    engine.provision().unwrap();

    let (_, cache, _) = paths(&engine, stack);
    assert!(h.provider.called("update"));
    assert!(h.fs.get(&cache).is_some());
    // Live protection was off, so it is switched back on
    assert!(h.provider.called("protect"));
}

#[test]
fn declined_template_change_aborts_before_update() {
    let h = Harness::new(Provider::default());
    let mut first = h.engine(true);
    add_vpc(&mut first, VPC_BODY);
    first.provision().unwrap();
    h.provider.calls.lock().unwrap().clear();

    let mut second = h.engine(false);
    let (_, stack) = add_vpc(
        &mut second,
        "Resources:\n  Vpc:\n    Type: AWS::EC2::VPC\n  Igw:\n    Type: AWS::EC2::InternetGateway\n",
    );
    let err = second.provision_stack(stack).unwrap_err();

    assert!(err.is_user_abort());
    assert!(!h.provider.called("update"));
    assert!(h.lines.any("Confirm template changes to CloudFormation Stack: ne-dev-vpc"));
    assert!(h.lines.any("+++ Added"));
    assert!(h.lines.any("Aborted run."));
}

#[test]
fn failed_stack_prompt_declined_aborts() {
    let h = Harness::new(Provider::with_status(StackStatus::CreateFailed));
    let mut engine = h.engine(false);
    let (_, stack) = add_vpc(&mut engine, VPC_BODY);

    let err = engine.provision_stack(stack).unwrap_err();

    assert!(err.is_user_abort());
    assert!(h.lines.any("The stack is in a 'CREATE_FAILED' state."));
    assert!(h.lines.any("Aborted"));
    assert!(!h.provider.called("delete"));
}

#[test]
fn failed_stack_prompt_accepted_recreates() {
    let h = Harness::new(Provider::with_status(StackStatus::CreateFailed));
    let mut engine = h.engine(true);
    let (_, stack) = add_vpc(&mut engine, VPC_BODY);

    engine.provision_stack(stack).unwrap();

    let calls = h.provider.calls();
    let delete = calls.iter().position(|c| c == "delete").unwrap();
    let create = calls.iter().position(|c| c == "create").unwrap();
    assert!(delete < create);
}

#[test]
fn update_only_stack_is_never_created() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    let group = engine.add_group("net", "ne-dev", "", None).unwrap();
    let mut spec = vpc_stack(VPC_BODY);
    spec.template.update_only = true;
    let stack = engine.add_stack(group, spec).unwrap();

    engine.provision_stack(stack).unwrap();

    assert!(!h.provider.called("create"));
    assert_eq!(engine.stack(stack).unwrap().action, None);
}

#[test]
fn disabled_missing_stack_is_skipped() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    let group = engine.add_group("net", "ne-dev", "", None).unwrap();
    let mut spec = vpc_stack(VPC_BODY);
    spec.template.enabled = false;
    let stack = engine.add_stack(group, spec).unwrap();

    engine.provision_stack(stack).unwrap();

    assert!(!h.provider.called("create"));
    assert!(h.lines.any("Disabled"));
}

// ============================================================================
// Provider recovery
// ============================================================================

#[test]
fn expired_token_forces_a_new_session_and_retries() {
    let provider = Provider::default();
    provider.expire_once.store(true, Ordering::SeqCst);
    let h = Harness::new(provider);
    let mut engine = h.engine(true);
    let (_, stack) = add_vpc(&mut engine, VPC_BODY);

    engine.provision_stack(stack).unwrap();

    assert_eq!(&h.forced.lock().unwrap()[..2], &[false, true]);
    assert!(h.lines.any("Token"));
    assert!(h.provider.called("create"));
}

#[test]
fn throttled_call_is_retried() {
    let provider = Provider::default();
    provider.throttle_once.store(true, Ordering::SeqCst);
    let h = Harness::new(provider);
    let mut engine = h.engine(true);
    let (_, stack) = add_vpc(&mut engine, VPC_BODY);

    engine.provision_stack(stack).unwrap();

    assert!(h.lines.any("Provider call throttled"));
    assert!(h.provider.called("create"));
}

// ============================================================================
// Hooks
// ============================================================================

#[test]
fn create_hooks_run_around_the_provider_call() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    let group = engine.add_group("net", "ne-dev", "", None).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut spec = vpc_stack(VPC_BODY);
    for timing in [HookTiming::Pre, HookTiming::Post] {
        let seen = Arc::clone(&seen);
        let method: HookMethod = Arc::new(move |ctx: &HookContext<'_>| {
            seen.lock().unwrap().push(format!("{}:{}", ctx.timing, ctx.stack_name));
            Ok(())
        });
        spec.hooks
            .add("record", &[StackAction::Create], timing, method, None, None);
    }
    engine.add_stack(group, spec).unwrap();

    engine.provision().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["pre:ne-dev-vpc".to_string(), "post:ne-dev-vpc".to_string()]
    );
    assert!(h.lines.any("Run"));
}

#[test]
fn failing_pre_hook_stops_the_create() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    let group = engine.add_group("net", "ne-dev", "", None).unwrap();
    let mut spec = vpc_stack(VPC_BODY);
    let method: HookMethod = Arc::new(|_: &HookContext<'_>| Err("bucket not empty".into()));
    spec.hooks
        .add("guard", &[StackAction::Create], HookTiming::Pre, method, None, None);
    let stack = engine.add_stack(group, spec).unwrap();

    let err = engine.provision_stack(stack).unwrap_err();

    assert!(matches!(
        err,
        StrataError::Application(ApplicationError::HookFailed { .. })
    ));
    assert!(!h.provider.called("create"));
}

// ============================================================================
// References and parameters
// ============================================================================

#[test]
fn registered_output_resolves_to_live_value() {
    let provider = Provider::with_status(StackStatus::CreateComplete);
    provider.outputs.lock().unwrap().push(StackOutput {
        key: "VpcId".into(),
        value: "vpc-123".into(),
    });
    let h = Harness::new(provider);
    let mut engine = h.engine(true);
    let (_, vpc) = add_vpc(&mut engine, VPC_BODY);
    engine
        .register_output(vpc, "netenv.ne.dev.vpc.id", "VpcId")
        .unwrap();

    let reference = Reference::parse("paco.ref netenv.ne.dev.vpc.id").unwrap();
    assert_eq!(engine.resolve_value(&reference).unwrap(), "vpc-123");
    assert_eq!(
        engine.resolve(&reference).unwrap(),
        Resolved::Stack {
            stack: vpc,
            output_key: Some("VpcId".into())
        }
    );
}

#[test]
fn stack_output_parameter_reads_upstream_outputs() {
    let provider = Provider::with_status(StackStatus::CreateComplete);
    provider.outputs.lock().unwrap().push(StackOutput {
        key: "VpcId".into(),
        value: "vpc-123".into(),
    });
    let h = Harness::new(provider);
    let mut engine = h.engine(true);
    let (group, vpc) = add_vpc(&mut engine, VPC_BODY);
    engine
        .register_output(vpc, "netenv.ne.dev.vpc.id", "VpcId")
        .unwrap();
    let subnet = engine
        .add_stack(
            group,
            NewStack::new(
                "netenv.ne.dev.subnet",
                "dev",
                "us-west-2",
                StackTemplate::new("subnet", "netenv.ne.dev.subnet").with_body(VPC_BODY),
            ),
        )
        .unwrap();

    engine
        .set_parameter(
            subnet,
            "VpcId",
            &Value::String("paco.ref netenv.ne.dev.vpc.id".into()),
            false,
        )
        .unwrap();
    engine
        .set_parameter(subnet, "Cidr", &Value::String("10.0.0.0/24".into()), true)
        .unwrap();

    let create = engine
        .generate_stack_parameters(subnet, ParameterMode::Create)
        .unwrap();
    assert_eq!(create[0].parameter_value.as_deref(), Some("vpc-123"));

    let update = engine
        .generate_stack_parameters(subnet, ParameterMode::Update)
        .unwrap();
    assert!(update[1].use_previous_value);
    assert_eq!(update[1].parameter_value, None);
}

#[test]
fn list_parameter_rejects_mixed_sources() {
    let h = Harness::new(Provider::default());
    let mut model = MockModelResolver::new();
    model.expect_resolve().returning(|r| {
        Ok((r.path() == "netenv.ne.dev.cidr").then(|| ModelValue::Scalar("10.0.0.0/16".into())))
    });
    let mut engine = h.engine_with(Harness::options(), true, model);
    let (_, vpc) = add_vpc(&mut engine, VPC_BODY);
    engine
        .register_output(vpc, "netenv.ne.dev.vpc.id", "VpcId")
        .unwrap();

    let refs = vec![
        "paco.ref netenv.ne.dev.vpc.id".to_string(),
        "paco.ref netenv.ne.dev.cidr".to_string(),
    ];
    let err = engine
        .set_list_parameter(vpc, "Mixed", &refs, None, false)
        .unwrap_err();

    assert!(matches!(
        err,
        StrataError::Domain(DomainError::MixedListParameter { .. })
    ));
}

#[test]
fn unresolved_sub_reference_names_the_stack() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    let (_, stack) = add_vpc(
        &mut engine,
        "Value: paco.sub '${paco.ref netenv.missing.thing}'\n",
    );

    let err = engine.generate_template(stack).unwrap_err();

    match err {
        StrataError::Application(ApplicationError::UnresolvedReference { context, .. }) => {
            assert!(context.contains("Stack: ne-dev-vpc"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn model_scalar_is_substituted_into_the_template() {
    let h = Harness::new(Provider::default());
    let mut model = MockModelResolver::new();
    model.expect_resolve().returning(|r| {
        Ok((r.path() == "accounts.dev").then(|| ModelValue::Scalar("123456789012".into())))
    });
    let mut engine = h.engine_with(Harness::options(), true, model);
    let (_, stack) = add_vpc(
        &mut engine,
        "Value: paco.sub 'arn:aws:iam::${paco.ref accounts.<account>}:root'\n",
    );

    let body = engine.generate_template(stack).unwrap();

    assert_eq!(body, "Value: arn:aws:iam::123456789012:root\n");
    assert_eq!(engine.rendered_template(stack), Some(body.as_str()));
}

// ============================================================================
// Scheduling and filters
// ============================================================================

#[test]
fn filtered_stack_is_logged_and_never_touches_the_provider() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    add_vpc(&mut engine, VPC_BODY);
    engine.set_filter(Some("netenv.ne.prod"));

    engine.provision().unwrap();

    assert!(h.lines.any("Filtered"));
    assert!(h.forced.lock().unwrap().is_empty());
}

#[test]
fn provision_reports_stacks_dropped_from_the_group() {
    let h = Harness::new(Provider::default());
    let mut engine = h.engine(true);
    let (group, _) = add_vpc(&mut engine, VPC_BODY);

    let mut previous = GroupState::default();
    previous.push("ne-dev-old", "dev", "us-west-2");
    let state_path = engine
        .layout()
        .group_state(&engine.group(group).unwrap().state_file_name());
    h.fs.put(&state_path, &serde_yaml::to_string(&previous).unwrap());

    engine.provision().unwrap();

    assert!(h.lines.any("The following Stacks are no longer needed:"));
    assert!(h.lines.any("   - dev.us-west-2: ne-dev-old"));
    let written: GroupState = serde_yaml::from_str(&h.fs.get(&state_path).unwrap()).unwrap();
    assert_eq!(written.stack_names, vec!["ne-dev-vpc".to_string()]);
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn declined_delete_touches_nothing() {
    let h = Harness::new(Provider::with_status(StackStatus::CreateComplete));
    let mut engine = h.engine(false);
    add_vpc(&mut engine, VPC_BODY);

    let err = engine.delete().unwrap_err();

    assert!(err.is_user_abort());
    assert!(h.provider.calls().is_empty());
}

#[test]
fn delete_removes_applied_state_and_the_stack() {
    let h = Harness::new(Provider::default());
    let mut first = h.engine(true);
    add_vpc(&mut first, VPC_BODY);
    first.provision().unwrap();

    let mut engine = h.engine(true);
    let (_, stack) = add_vpc(&mut engine, VPC_BODY);
    engine.delete().unwrap();

    let (build, cache, applied) = paths(&engine, stack);
    assert!(h.fs.get(&build).is_none());
    assert!(h.fs.get(&cache).is_none());
    assert!(h.fs.get(&applied).is_none());
    assert!(h.provider.called("unprotect"));
    assert!(h.provider.called("delete"));
}

#[test]
fn change_protected_stack_is_not_deleted() {
    let h = Harness::new(Provider::with_status(StackStatus::CreateComplete));
    let mut engine = h.engine(true);
    let group = engine.add_group("net", "ne-dev", "", None).unwrap();
    let mut spec = vpc_stack(VPC_BODY);
    spec.change_protected = true;
    engine.add_stack(group, spec).unwrap();

    engine.delete().unwrap();

    assert!(!h.provider.called("delete"));
    assert!(h.lines.any("Protected"));
}

#[test]
fn termination_protected_stack_survives_a_declined_second_prompt() {
    let h = Harness::new(Provider::with_status(StackStatus::CreateComplete));
    let mut engine = {
        let mut confirm = MockConfirmationPort::new();
        confirm
            .expect_confirm()
            .returning(|question, _| Ok(!question.contains("forever")));
        let mut sessions = MockSessionProvider::new();
        let provider = h.provider.clone();
        sessions
            .expect_client()
            .returning(move |_, _, _| Ok(Arc::new(provider.mock()) as Arc<dyn CloudFormation>));
        Engine::new(
            Harness::options(),
            Box::new(h.fs.clone()),
            Box::new(sessions),
            Box::new(confirm),
            Box::new(h.lines.clone()),
            Box::new(empty_model()),
        )
    };
    let group = engine.add_group("net", "ne-dev", "", None).unwrap();
    let mut spec = vpc_stack(VPC_BODY);
    spec.termination_protection = true;
    engine.add_stack(group, spec).unwrap();

    engine.delete().unwrap();

    assert!(h.lines.any("This Stack has Termination Protection enabled!"));
    assert!(h.lines.any("Destruction aborted. Allowing stack to exist."));
    assert!(!h.provider.called("delete"));
}
