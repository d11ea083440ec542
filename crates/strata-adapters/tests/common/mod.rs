//! Shared fixtures for the engine scenario tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use strata_adapters::{
    MemoryCloudFormation, MemoryFilesystem, RecordingReporter, ScriptedConfirm, StaticSessions,
    YamlModel,
};
use strata_core::{
    application::{ConfirmationPort, Engine, EngineOptions},
    domain::{GroupId, NewStack, StackId, StackTemplate},
};

pub const ACCOUNT: &str = "dev";
pub const REGION: &str = "us-west-2";
pub const HOME: &str = "/p";

/// One simulated world: filesystem, provider and output shared by every
/// engine built from it, so consecutive engines behave like consecutive
/// runs.
#[derive(Clone)]
pub struct World {
    pub fs: MemoryFilesystem,
    pub sim: MemoryCloudFormation,
    pub sessions: StaticSessions,
    pub reporter: RecordingReporter,
}

impl World {
    pub fn new() -> Self {
        let sim = MemoryCloudFormation::new();
        Self {
            fs: MemoryFilesystem::new(),
            sessions: StaticSessions::new(sim.clone()),
            sim,
            reporter: RecordingReporter::new(),
        }
    }

    pub fn options() -> EngineOptions {
        EngineOptions {
            home: PathBuf::from(HOME),
            throttle_delay: Duration::ZERO,
            ..EngineOptions::default()
        }
    }

    /// An engine answering prompts from `answers`.
    pub fn engine(&self, answers: impl IntoIterator<Item = bool>) -> (Engine, ScriptedConfirm) {
        let confirm = ScriptedConfirm::new(answers);
        let engine = self.engine_with(
            Self::options(),
            Box::new(confirm.clone()),
            YamlModel::default(),
        );
        (engine, confirm)
    }

    pub fn engine_with(
        &self,
        options: EngineOptions,
        confirm: Box<dyn ConfirmationPort>,
        model: YamlModel,
    ) -> Engine {
        Engine::new(
            options,
            Box::new(self.fs.clone()),
            Box::new(self.sessions.clone()),
            confirm,
            Box::new(self.reporter.clone()),
            Box::new(model),
        )
    }
}

/// The root group `ne-dev`.
pub fn group(engine: &mut Engine) -> GroupId {
    engine.add_group("g", "ne-dev", "", None).unwrap()
}

/// A stack named `ne-dev-<aws_name>` owning `app.<aws_name>`.
pub fn stack(aws_name: &str, body: &str) -> NewStack {
    let config_ref = format!("app.{aws_name}");
    NewStack::new(
        config_ref.clone(),
        ACCOUNT,
        REGION,
        StackTemplate::new(aws_name, config_ref).with_body(body),
    )
}

pub struct Paths {
    pub build: PathBuf,
    pub cache: PathBuf,
    pub output: PathBuf,
    pub applied: PathBuf,
    pub applied_parameters: PathBuf,
}

pub fn paths(engine: &Engine, id: StackId) -> Paths {
    let s = engine.stack(id).unwrap();
    let stem = s.file_stem();
    let layout = engine.layout();
    Paths {
        build: layout.build_template(&s.account, &s.region, &stem),
        cache: layout.cache_file(&s.account, &s.region, &stem),
        output: layout.output_file(&s.account, &s.region, &stem),
        applied: layout.applied_template(&s.account, &s.region, &stem),
        applied_parameters: layout.applied_parameters(&s.account, &s.region, &stem),
    }
}
