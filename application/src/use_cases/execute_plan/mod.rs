//! Execute Plan use case
//!
//! Applies an [`ExecutionPlan`] step by step against the tool server:
//!
//! | Action   | Pipeline                                                        |
//! |----------|-----------------------------------------------------------------|
//! | create   | tool check, resolve, defaults, validate, call, map, wait, state |
//! | update   | tool check, resolve, defaults, validate, call, map, state       |
//! | delete   | tool check, resolve, defaults, validate, call                   |
//! | validate | resolve (and call, when a tool is named)                        |
//! | retrieve | built-in lookup, map, state                                     |
//!
//! Steps run strictly in plan order. The first failing step stops the run;
//! nothing already applied is rolled back.

mod arguments;
mod extraction;
mod progress;
mod readiness;
mod retrieval;
mod state_sync;
mod types;

pub use types::{ExecutePlanError, Result};

use crate::config::ExecutorParams;
use crate::ports::cloud_lookup::CloudLookupPort;
use crate::ports::execution_logger::{ExecutionLogger, NoExecutionLogger};
use crate::ports::tool_server::ToolServerPort;
use crate::use_cases::resolve_reference::DependencyResolver;
use crate::use_cases::shared::sleep_cancellable;
use arguments::validate_required;
use infra_agent_domain::{
    DomainError, ExecutionEvent, ExecutionPlan, ExecutionRun, FieldPriorities, PlanStep,
    ResourceMappingStore, RetrievalRegistry, StepAction, StepOutcome, ToolCatalog, ToolOutput,
};
use progress::ProgressPublisher;
use serde_json::{Value, json};
use state_sync::resource_type_from_tool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Use case for executing (or simulating) a plan
pub struct PlanExecutor {
    server: Arc<dyn ToolServerPort>,
    catalog: Arc<ToolCatalog>,
    lookup: Arc<dyn CloudLookupPort>,
    resolver: DependencyResolver,
    registry: RetrievalRegistry,
    params: ExecutorParams,
    logger: Arc<dyn ExecutionLogger>,
    progress: Option<mpsc::Sender<ExecutionEvent>>,
    cancellation_token: Option<CancellationToken>,
}

impl PlanExecutor {
    pub fn new(
        server: Arc<dyn ToolServerPort>,
        catalog: Arc<ToolCatalog>,
        mapping: Arc<ResourceMappingStore>,
        lookup: Arc<dyn CloudLookupPort>,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(mapping, server.clone()),
            server,
            catalog,
            lookup,
            registry: RetrievalRegistry::builtin(),
            params: ExecutorParams::default(),
            logger: Arc::new(NoExecutionLogger),
            progress: None,
            cancellation_token: None,
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_params(mut self, params: ExecutorParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_field_priorities(mut self, priorities: FieldPriorities) -> Self {
        self.resolver = self.resolver.with_field_priorities(priorities);
        self
    }

    pub fn with_registry(mut self, registry: RetrievalRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ExecutionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Attach a bounded queue that receives every execution event.
    pub fn with_progress(mut self, sender: mpsc::Sender<ExecutionEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// The mapping store this executor writes resolved ids to.
    pub fn mapping(&self) -> &Arc<ResourceMappingStore> {
        self.resolver.mapping()
    }

    /// Execute every step against the tool server.
    pub async fn execute(&self, plan: &mut ExecutionPlan) -> ExecutionRun {
        self.run(plan, false).await
    }

    /// Walk the plan without contacting the tool server.
    ///
    /// Every step completes after the configured delay with a fixed
    /// dry-run output. The plan is not validated.
    pub async fn simulate(&self, plan: &mut ExecutionPlan) -> ExecutionRun {
        self.run(plan, true).await
    }

    async fn run(&self, plan: &mut ExecutionPlan, simulated: bool) -> ExecutionRun {
        let cancel = self.cancellation_token.clone().unwrap_or_default();
        let mut run = ExecutionRun::start(plan.name.clone(), simulated);
        let progress = ProgressPublisher::new(
            run.id.clone(),
            self.progress.as_ref(),
            self.logger.as_ref(),
            self.params.initial_send_timeout,
            self.params.progress_send_timeout,
        );
        let total = plan.len();

        info!(execution_id = %run.id, steps = total, simulated, "Starting plan execution");
        progress.execution_started(total, simulated).await;

        if !simulated && let Err(e) = plan.validate() {
            warn!(execution_id = %run.id, error = %e, "Plan rejected");
            run.push_error(ExecutePlanError::from(e).to_string());
            run.finish();
            progress.execution_completed(&run).await;
            return run;
        }

        for step in plan.steps.iter_mut() {
            let mut outcome = StepOutcome::start(step);
            step.mark_running();

            let result = if cancel.is_cancelled() {
                Err(ExecutePlanError::Cancelled)
            } else {
                progress.step_started(step).await;
                if simulated {
                    self.simulate_step(step, &cancel).await
                } else {
                    self.execute_step(step, &cancel).await
                }
            };

            match result {
                Ok(output) => {
                    step.mark_completed();
                    outcome.complete(output);
                    run.record(outcome);
                    info!(step_id = %step.id, "Step completed");
                    progress.step_completed(step).await;
                    progress
                        .step_progress(step, run.completed_steps(), total)
                        .await;
                }
                Err(e) => {
                    step.mark_failed();
                    let message = e.to_string();
                    warn!(step_id = %step.id, error = %message, "Step failed");
                    outcome.fail(message.clone());
                    run.record(outcome);
                    run.push_error(format!("Step {} failed: {}", step.id, message));
                    progress.step_failed(step, &message).await;
                    break;
                }
            }
        }

        run.finish();
        info!(
            execution_id = %run.id,
            status = %run.status,
            completed = run.completed_steps(),
            total,
            "Plan execution finished"
        );
        progress.execution_completed(&run).await;
        run
    }

    async fn simulate_step(&self, step: &PlanStep, cancel: &CancellationToken) -> Result<Value> {
        debug!(step_id = %step.id, action = %step.action, "Simulating step");
        if !sleep_cancellable(self.params.simulate_delay, cancel).await {
            return Err(ExecutePlanError::Cancelled);
        }
        Ok(json!({
            "simulated": true,
            "message": "Dry run - no actual changes made",
        }))
    }

    async fn execute_step(&self, step: &PlanStep, cancel: &CancellationToken) -> Result<Value> {
        match step.action {
            StepAction::Create | StepAction::Update | StepAction::Delete => {
                self.execute_tool_step(step, cancel).await
            }
            StepAction::Validate => self.validate_step(step, cancel).await,
            StepAction::Retrieve => self.retrieve_step(step, cancel).await,
        }
    }

    /// Required parameters of `tool`, or `UnknownTool`.
    fn require_tool(&self, tool: &str) -> Result<Vec<String>> {
        self.catalog
            .get(tool)
            .map(|descriptor| descriptor.required_parameters())
            .ok_or_else(|| ExecutePlanError::UnknownTool {
                tool: tool.to_string(),
                available: self.catalog.names(),
            })
    }

    /// Resolve, default and validate a step's arguments, then call `tool`.
    async fn call_step_tool(
        &self,
        step: &PlanStep,
        tool: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let required = self.require_tool(tool)?;
        let mut arguments = self.resolver.resolve_map(step.arguments(), cancel).await?;
        self.apply_defaults(step, tool, &required, &mut arguments, cancel)
            .await?;
        validate_required(tool, &required, &arguments)?;

        debug!(step_id = %step.id, tool = %tool, "Calling tool");
        Ok(self
            .server
            .call_tool(tool, Value::Object(arguments), cancel)
            .await?)
    }

    async fn execute_tool_step(
        &self,
        step: &PlanStep,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let tool = step.tool_name().ok_or_else(|| {
            ExecutePlanError::from(DomainError::MissingTool {
                step_id: step.id.clone(),
                action: step.action.to_string(),
            })
        })?;
        let output = self.call_step_tool(step, tool, cancel).await?;

        let resource_id = match self.params.id_rules.extract(tool, &output) {
            Some(id) => id,
            None => {
                debug!(step_id = %step.id, tool = %tool, "No id in tool result, using step resourceId");
                step.resource_id.clone()
            }
        };

        if matches!(step.action, StepAction::Create | StepAction::Update) {
            if resource_id.is_empty() {
                warn!(step_id = %step.id, tool = %tool, "No resource id to record");
            } else {
                self.mapping().set(step.id.clone(), resource_id.clone());
                info!(step_id = %step.id, resource_id = %resource_id, "Recorded resource mapping");
            }
        }

        if step.action == StepAction::Create && !resource_id.is_empty() {
            self.wait_until_ready(tool, &resource_id, cancel).await?;
        }

        if matches!(step.action, StepAction::Create | StepAction::Update) {
            self.record_state(
                step,
                &resource_id,
                &resource_type_from_tool(tool),
                &output,
                cancel,
            )
            .await;
        }

        Ok(json!({
            "resource_id": resource_id,
            "plan_step_id": step.id,
            "mcp_tool": tool,
            "mcp_response": output,
        }))
    }

    async fn validate_step(&self, step: &PlanStep, cancel: &CancellationToken) -> Result<Value> {
        match step.tool_name() {
            Some(tool) => {
                let output = self.call_step_tool(step, tool, cancel).await?;
                Ok(json!({
                    "resource_id": step.resource_id,
                    "status": "validated",
                    "mcp_response": output,
                }))
            }
            None => {
                self.resolver.resolve_map(&step.parameters, cancel).await?;
                Ok(json!({
                    "resource_id": step.resource_id,
                    "status": "validated",
                    "checks": ["parameters_resolved"],
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadinessParams;
    use crate::ports::cloud_lookup::{ImageFamily, LookupError, SubnetInfo, VpcInfo};
    use crate::ports::tool_server::{
        ADD_RESOURCE_TOOL, EXPORT_STATE_TOOL, SAVE_STATE_TOOL, ToolServerError,
    };
    use async_trait::async_trait;
    use infra_agent_domain::{ExecutionEventKind, RunStatus, StepStatus, ToolDescriptor};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    // ==================== Mock Tool Server ====================

    type Reply = std::result::Result<Value, ToolServerError>;

    /// Tool server answering from per-tool scripts, recording every call.
    struct ScriptedServer {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
        fallbacks: Mutex<HashMap<String, Reply>>,
        state: Mutex<Value>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedServer {
        fn new() -> Self {
            Self {
                replies: Mutex::new(HashMap::new()),
                fallbacks: Mutex::new(HashMap::new()),
                state: Mutex::new(json!({"managed_state": {"resources": {}}})),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn reply(self, tool: &str, value: Value) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(tool.to_string())
                .or_default()
                .push_back(Ok(value));
            self
        }

        fn fail(self, tool: &str, error: ToolServerError) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(tool.to_string())
                .or_default()
                .push_back(Err(error));
            self
        }

        /// Reply used once the tool's script is exhausted.
        fn always(self, tool: &str, reply: Reply) -> Self {
            self.fallbacks
                .lock()
                .unwrap()
                .insert(tool.to_string(), reply);
            self
        }

        fn with_state(self, state: Value) -> Self {
            *self.state.lock().unwrap() = state;
            self
        }

        fn calls_to(&self, tool: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == tool)
                .map(|(_, args)| args.clone())
                .collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolServerPort for ScriptedServer {
        async fn call_tool(
            &self,
            name: &str,
            arguments: Value,
            cancel: &CancellationToken,
        ) -> std::result::Result<ToolOutput, ToolServerError> {
            if cancel.is_cancelled() {
                return Err(ToolServerError::Cancelled);
            }
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            if name == EXPORT_STATE_TOOL {
                return Ok(ToolOutput::from_value(self.state.lock().unwrap().clone()));
            }
            let scripted = self
                .replies
                .lock()
                .unwrap()
                .get_mut(name)
                .and_then(|queue| queue.pop_front());
            let reply = scripted
                .or_else(|| self.fallbacks.lock().unwrap().get(name).cloned())
                .unwrap_or_else(|| Ok(json!({"success": true})));
            reply.map(ToolOutput::from_value)
        }
    }

    // ==================== Stub Cloud Lookup ====================

    struct StubLookup {
        default_vpc: Option<String>,
        vpcs: Vec<VpcInfo>,
        calls: Mutex<Vec<String>>,
    }

    impl StubLookup {
        fn new() -> Self {
            Self {
                default_vpc: Some("vpc-default".to_string()),
                vpcs: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn without_default_vpc(mut self, vpcs: Vec<VpcInfo>) -> Self {
            self.default_vpc = None;
            self.vpcs = vpcs;
            self
        }

        fn record(&self, call: String, cancel: &CancellationToken) -> std::result::Result<(), LookupError> {
            if cancel.is_cancelled() {
                return Err(LookupError::Cancelled);
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CloudLookupPort for StubLookup {
        async fn latest_image(
            &self,
            family: ImageFamily,
            architecture: &str,
            cancel: &CancellationToken,
        ) -> std::result::Result<String, LookupError> {
            self.record(format!("latest_image:{}:{}", family, architecture), cancel)?;
            Ok("ami-latest".to_string())
        }

        async fn default_vpc(&self, cancel: &CancellationToken) -> std::result::Result<String, LookupError> {
            self.record("default_vpc".to_string(), cancel)?;
            self.default_vpc
                .clone()
                .ok_or_else(|| LookupError::NotFound("default VPC".to_string()))
        }

        async fn default_subnet(
            &self,
            cancel: &CancellationToken,
        ) -> std::result::Result<SubnetInfo, LookupError> {
            self.record("default_subnet".to_string(), cancel)?;
            Ok(SubnetInfo {
                subnet_id: "subnet-default".to_string(),
                vpc_id: "vpc-default".to_string(),
            })
        }

        async fn availability_zones(
            &self,
            cancel: &CancellationToken,
        ) -> std::result::Result<Vec<String>, LookupError> {
            self.record("availability_zones".to_string(), cancel)?;
            Ok(vec![
                "us-west-2a".to_string(),
                "us-west-2b".to_string(),
                "us-west-2c".to_string(),
            ])
        }

        async fn subnets_in_vpc(
            &self,
            vpc_id: &str,
            cancel: &CancellationToken,
        ) -> std::result::Result<Vec<String>, LookupError> {
            self.record(format!("subnets_in_vpc:{}", vpc_id), cancel)?;
            Ok(vec!["subnet-a".to_string(), "subnet-b".to_string()])
        }

        async fn list_vpcs(&self, cancel: &CancellationToken) -> std::result::Result<Vec<VpcInfo>, LookupError> {
            self.record("list_vpcs".to_string(), cancel)?;
            Ok(self.vpcs.clone())
        }

        async fn select_subnets_for_alb(
            &self,
            vpc_id: &str,
            scheme: &str,
            cancel: &CancellationToken,
        ) -> std::result::Result<Vec<String>, LookupError> {
            self.record(format!("select_subnets_for_alb:{}:{}", vpc_id, scheme), cancel)?;
            Ok(vec!["subnet-pub-a".to_string(), "subnet-pub-b".to_string()])
        }

        async fn db_endpoint(
            &self,
            instance_id: &str,
            cancel: &CancellationToken,
        ) -> std::result::Result<String, LookupError> {
            self.record(format!("db_endpoint:{}", instance_id), cancel)?;
            Ok(format!("{}.abc123.us-west-2.rds.amazonaws.com", instance_id))
        }
    }

    // ==================== Flow Test Infrastructure ====================

    fn tool(name: &str, required: &[&str]) -> ToolDescriptor {
        ToolDescriptor::new(name, format!("{} tool", name)).with_schema(json!({
            "type": "object",
            "properties": {},
            "required": required,
        }))
    }

    fn catalog() -> Arc<ToolCatalog> {
        Arc::new(ToolCatalog::from_tools(vec![
            tool("create-vpc", &["cidrBlock", "name"]),
            tool("create-subnet", &["vpcId", "cidrBlock"]),
            tool("create-security-group", &["vpcId", "groupName", "description"]),
            tool("create-ec2-instance", &["imageId", "instanceType"]),
            tool("create-nat-gateway", &["subnetId"]),
            tool("update-security-group", &["groupId"]),
            tool("delete-vpc", &["vpcId"]),
            tool("describe-vpc", &["vpcId"]),
        ]))
    }

    fn executor(server: &Arc<ScriptedServer>, lookup: &Arc<StubLookup>) -> PlanExecutor {
        PlanExecutor::new(
            server.clone(),
            catalog(),
            Arc::new(ResourceMappingStore::new()),
            lookup.clone(),
        )
        .with_params(ExecutorParams::default().with_readiness(ReadinessParams::disabled()))
    }

    fn setup(server: ScriptedServer) -> (Arc<ScriptedServer>, Arc<StubLookup>, PlanExecutor) {
        let server = Arc::new(server);
        let lookup = Arc::new(StubLookup::new());
        let executor = executor(&server, &lookup);
        (server, lookup, executor)
    }

    fn create(id: &str, tool: &str) -> PlanStep {
        PlanStep::new(id, StepAction::Create).with_tool(tool)
    }

    fn retrieve(id: &str, value_type: &str) -> PlanStep {
        PlanStep::new(id, StepAction::Retrieve).with_param("value_type", value_type)
    }

    fn output(run: &ExecutionRun, step_id: &str) -> Value {
        run.outcome(step_id)
            .and_then(|o| o.output.clone())
            .unwrap_or(Value::Null)
    }

    // ==================== Simulation ====================

    #[tokio::test(start_paused = true)]
    async fn test_simulate_completes_every_step() {
        let server = Arc::new(ScriptedServer::new());
        let lookup = Arc::new(StubLookup::new());
        let executor = PlanExecutor::new(
            server.clone(),
            Arc::new(ToolCatalog::new()),
            Arc::new(ResourceMappingStore::new()),
            lookup.clone(),
        );
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-moon-base"),
            PlanStep::new("s2", StepAction::Retrieve).with_name("Look around"),
            PlanStep::new("s3", StepAction::Delete),
        ])
        .with_name("anything goes");

        let run = executor.simulate(&mut plan).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.simulated);
        assert_eq!(run.completed_steps(), 3);
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert_eq!(output(&run, "s1")["simulated"], true);
        assert_eq!(
            output(&run, "s2")["message"],
            "Dry run - no actual changes made"
        );
        assert_eq!(server.call_count(), 0);
        assert!(lookup.calls().is_empty());
    }

    // ==================== Native Tool Steps ====================

    #[tokio::test]
    async fn test_network_then_subnet_scenario() {
        let (server, _, executor) = setup(
            ScriptedServer::new()
                .reply("create-vpc", json!({"vpcId": "vpc-123", "cidrBlock": "10.0.0.0/16"}))
                .reply("create-subnet", json!({"subnetId": "subnet-9", "vpcId": "vpc-123"})),
        );
        let mut plan = ExecutionPlan::new(vec![
            create("step-network", "create-vpc")
                .with_resource_id("main-vpc")
                .with_tool_param("cidrBlock", "10.0.0.0/16")
                .with_tool_param("name", "main"),
            create("step-subnet", "create-subnet")
                .with_tool_param("vpcId", "{{step-network}}")
                .with_tool_param("cidrBlock", "10.0.1.0/24")
                .with_dependency("step-network"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        assert_eq!(
            executor.mapping().get("step-network").as_deref(),
            Some("vpc-123")
        );
        assert_eq!(
            executor.mapping().get("step-subnet").as_deref(),
            Some("subnet-9")
        );
        let subnet_calls = server.calls_to("create-subnet");
        assert_eq!(subnet_calls.len(), 1);
        assert_eq!(subnet_calls[0]["vpcId"], "vpc-123");

        let network = output(&run, "step-network");
        assert_eq!(network["resource_id"], "vpc-123");
        assert_eq!(network["plan_step_id"], "step-network");
        assert_eq!(network["mcp_tool"], "create-vpc");
        assert_eq!(network["mcp_response"]["vpcId"], "vpc-123");

        // Each step writes its resource plus a step reference, then saves
        let records = server.calls_to(ADD_RESOURCE_TOOL);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["resource_id"], "vpc-123");
        assert_eq!(records[0]["resource_type"], "vpc");
        assert_eq!(records[0]["properties"]["status"], "created_via_mcp");
        assert_eq!(records[1]["resource_id"], "step-network");
        assert_eq!(records[1]["resource_type"], "step_reference");
        assert_eq!(server.calls_to(SAVE_STATE_TOOL).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_required_parameter_never_dispatches() {
        let (server, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-subnet").with_tool_param("vpcId", "vpc-1"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(server.calls_to("create-subnet").is_empty());
        assert_eq!(
            run.errors,
            vec!["Step s1 failed: required parameter `cidrBlock` is missing for tool `create-subnet`"]
        );
        assert_eq!(plan.steps[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_required_parameter_fails() {
        let (server, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-subnet")
                .with_tool_param("vpcId", "")
                .with_tool_param("cidrBlock", "10.0.1.0/24"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.errors[0].contains("required parameter `vpcId` is empty"));
        assert_eq!(server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_vpc_defaults_from_environment() {
        let (server, _, executor) =
            setup(ScriptedServer::new().reply("create-vpc", json!({"vpcId": "vpc-1"})));
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-vpc").with_param("environment", "staging"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        let args = &server.calls_to("create-vpc")[0];
        assert_eq!(args["cidrBlock"], "10.1.0.0/16");
        assert_eq!(args["name"], "vpc-staging");
        assert_eq!(args["environment"], "staging");
    }

    #[tokio::test]
    async fn test_instance_defaults_use_image_lookup() {
        let (server, lookup, executor) =
            setup(ScriptedServer::new().reply("create-ec2-instance", json!({"instanceId": "i-1"})));
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-ec2-instance").with_param("workload_type", "memory-intensive"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        let args = &server.calls_to("create-ec2-instance")[0];
        assert_eq!(args["imageId"], "ami-latest");
        assert_eq!(args["instanceType"], "r5.large");
        assert_eq!(lookup.calls(), vec!["latest_image:amazon-linux-2:x86_64"]);
    }

    #[tokio::test]
    async fn test_instance_image_from_retrieval_step() {
        let (server, lookup, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            retrieve("step-ami", "latest_ami").with_param("os_type", "ubuntu"),
            create("s1", "create-ec2-instance")
                .with_param("ami_step_ref", "step-ami")
                .with_param("instanceType", "t3.small"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        assert_eq!(server.calls_to("create-ec2-instance")[0]["imageId"], "ami-latest");
        assert_eq!(lookup.calls(), vec!["latest_image:ubuntu:x86_64"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available_tools() {
        let (server, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![create("s1", "create-moon-base")]);

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.errors[0].contains("Unknown tool create-moon-base"));
        assert!(run.errors[0].contains("create-vpc"));
        assert_eq!(server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_plan_rejected_before_any_call() {
        let (server, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            create("dup", "create-vpc"),
            create("dup", "create-vpc"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.steps.is_empty());
        assert_eq!(run.errors, vec!["Duplicate step id: dup"]);
        assert_eq!(server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let (server, _, executor) = setup(ScriptedServer::new().fail(
            "create-vpc",
            ToolServerError::ToolExecution {
                tool: "create-vpc".to_string(),
                message: "VpcLimitExceeded".to_string(),
            },
        ));
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-vpc")
                .with_tool_param("cidrBlock", "10.0.0.0/16")
                .with_tool_param("name", "main"),
            create("s2", "create-subnet")
                .with_tool_param("vpcId", "{{s1}}")
                .with_tool_param("cidrBlock", "10.0.1.0/24"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(
            run.errors,
            vec!["Step s1 failed: Tool create-vpc failed: VpcLimitExceeded"]
        );
        assert_eq!(plan.steps[1].status, StepStatus::Pending);
        assert!(server.calls_to("create-subnet").is_empty());
        assert!(executor.mapping().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_fatal() {
        let broken = || {
            Err(ToolServerError::ToolExecution {
                tool: "state".to_string(),
                message: "disk full".to_string(),
            })
        };
        let (server, _, executor) = setup(
            ScriptedServer::new()
                .reply("create-vpc", json!({"vpcId": "vpc-1"}))
                .always(ADD_RESOURCE_TOOL, broken())
                .always(SAVE_STATE_TOOL, broken()),
        );
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-vpc").with_param("cidr", "10.9.0.0/16"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        assert_eq!(server.calls_to("create-vpc")[0]["cidrBlock"], "10.9.0.0/16");
        assert_eq!(server.calls_to(SAVE_STATE_TOOL).len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_can_be_disabled() {
        let server = Arc::new(ScriptedServer::new().reply("create-vpc", json!({"vpcId": "vpc-1"})));
        let lookup = Arc::new(StubLookup::new());
        let executor = executor(&server, &lookup).with_params(
            ExecutorParams::default()
                .with_persist_state(false)
                .with_readiness(ReadinessParams::disabled()),
        );
        let mut plan = ExecutionPlan::new(vec![create("s1", "create-vpc")]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        assert!(server.calls_to(ADD_RESOURCE_TOOL).is_empty());
        assert!(server.calls_to(SAVE_STATE_TOOL).is_empty());
    }

    #[tokio::test]
    async fn test_update_maps_fallback_id_and_delete_does_not_map() {
        let (server, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            PlanStep::new("s-update", StepAction::Update)
                .with_tool("update-security-group")
                .with_resource_id("web-sg")
                .with_tool_param("groupId", "sg-1"),
            PlanStep::new("s-delete", StepAction::Delete)
                .with_tool("delete-vpc")
                .with_resource_id("old-vpc")
                .with_tool_param("vpcId", "vpc-old"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        assert_eq!(executor.mapping().get("s-update").as_deref(), Some("web-sg"));
        assert!(!executor.mapping().contains("s-delete"));
        assert_eq!(output(&run, "s-delete")["resource_id"], "old-vpc");
        // Only the update is recorded in state
        let records = server.calls_to(ADD_RESOURCE_TOOL);
        assert!(records.iter().all(|r| r["resource_type"] != "vpc"));
        assert_eq!(records[0]["resource_type"], "security_group");
    }

    #[tokio::test]
    async fn test_validate_with_and_without_tool() {
        let (server, _, executor) = setup(ScriptedServer::new().reply("describe-vpc", json!({"vpcs": []})));
        executor.mapping().set("step-network", "vpc-123");
        let mut plan = ExecutionPlan::new(vec![
            PlanStep::new("check", StepAction::Validate).with_param("vpc", "{{step-network}}"),
            PlanStep::new("check-tool", StepAction::Validate)
                .with_tool("describe-vpc")
                .with_resource_id("main-vpc")
                .with_tool_param("vpcId", "{{step-network}}"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        assert_eq!(output(&run, "check")["checks"], json!(["parameters_resolved"]));
        assert_eq!(output(&run, "check-tool")["status"], "validated");
        assert_eq!(server.calls_to("describe-vpc")[0]["vpcId"], "vpc-123");
    }

    #[tokio::test]
    async fn test_unresolvable_reference_fails_step() {
        let (server, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-subnet")
                .with_tool_param("vpcId", "{{step-missing}}")
                .with_tool_param("cidrBlock", "10.0.1.0/24"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.errors[0].contains("step-missing"));
        assert_eq!(server.calls_to(EXPORT_STATE_TOOL).len(), 1);
        assert!(server.calls_to("create-subnet").is_empty());
    }

    // ==================== Cancellation & Progress ====================

    #[tokio::test]
    async fn test_cancel_before_execute_makes_no_calls() {
        let server = Arc::new(ScriptedServer::new());
        let lookup = Arc::new(StubLookup::new());
        let token = CancellationToken::new();
        token.cancel();
        let executor = executor(&server, &lookup).with_cancellation(token);
        let mut plan = ExecutionPlan::new(vec![
            create("s1", "create-vpc"),
            create("s2", "create-vpc"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.errors, vec!["Step s1 failed: Operation cancelled"]);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].error.as_deref(), Some("Operation cancelled"));
        assert_eq!(plan.steps[0].status, StepStatus::Failed);
        assert_eq!(plan.steps[1].status, StepStatus::Pending);
        assert_eq!(server.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_simulate_delay() {
        let server = Arc::new(ScriptedServer::new());
        let lookup = Arc::new(StubLookup::new());
        let token = CancellationToken::new();
        let executor = executor(&server, &lookup)
            .with_cancellation(token.clone())
            .with_params(ExecutorParams::default().with_simulate_delay(Duration::from_secs(60)));
        let mut plan = ExecutionPlan::new(vec![create("s1", "create-vpc")]);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        let run = executor.simulate(&mut plan).await;
        canceller.await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.errors, vec!["Step s1 failed: Operation cancelled"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_queue_without_consumer_does_not_stall() {
        let (tx, _rx) = mpsc::channel(1);
        let server = Arc::new(ScriptedServer::new());
        let lookup = Arc::new(StubLookup::new());
        let executor = executor(&server, &lookup).with_progress(tx);
        let mut plan = ExecutionPlan::new(vec![
            PlanStep::new("a", StepAction::Validate),
            PlanStep::new("b", StepAction::Validate),
            PlanStep::new("c", StepAction::Validate),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        assert_eq!(run.completed_steps(), 3);
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let server = Arc::new(ScriptedServer::new());
        let lookup = Arc::new(StubLookup::new());
        let executor = executor(&server, &lookup).with_progress(tx);
        let mut plan = ExecutionPlan::new(vec![PlanStep::new("a", StepAction::Validate)]);

        let run = executor.execute(&mut plan).await;
        drop(executor);

        let mut kinds = Vec::new();
        let mut last_progress = None;
        while let Some(event) = rx.recv().await {
            assert_eq!(event.execution_id, run.id);
            if event.kind == ExecutionEventKind::StepProgress {
                last_progress = event.progress;
            }
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                ExecutionEventKind::ExecutionStarted,
                ExecutionEventKind::StepStarted,
                ExecutionEventKind::StepCompleted,
                ExecutionEventKind::StepProgress,
                ExecutionEventKind::ExecutionCompleted,
            ]
        );
        assert_eq!(last_progress, Some(1.0));
    }

    // ==================== Readiness ====================

    fn nat_plan() -> ExecutionPlan {
        ExecutionPlan::new(vec![
            create("step-nat", "create-nat-gateway").with_tool_param("subnetId", "subnet-1"),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_nat_gateway_polled_until_available() {
        let server = Arc::new(
            ScriptedServer::new()
                .reply("create-nat-gateway", json!({"natGatewayId": "nat-1"}))
                .reply("describe-nat-gateways", json!({"natGateways": [{"state": "pending"}]}))
                .fail("describe-nat-gateways", ToolServerError::Transport("hiccup".to_string()))
                .reply("describe-nat-gateways", json!({"natGateways": [{"state": "available"}]})),
        );
        let lookup = Arc::new(StubLookup::new());
        let executor = executor(&server, &lookup).with_params(ExecutorParams::default());
        let mut plan = nat_plan();

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        let polls = server.calls_to("describe-nat-gateways");
        assert_eq!(polls.len(), 3);
        assert_eq!(polls[0], json!({"natGatewayIds": ["nat-1"]}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_fails_step() {
        let server = Arc::new(
            ScriptedServer::new()
                .reply("create-nat-gateway", json!({"natGatewayId": "nat-1"}))
                .always(
                    "describe-nat-gateways",
                    Ok(json!({"natGateways": [{"state": "pending"}]})),
                ),
        );
        let lookup = Arc::new(StubLookup::new());
        let readiness = ReadinessParams {
            nat_gateway_max_wait: Duration::from_secs(60),
            ..ReadinessParams::default()
        };
        let executor = executor(&server, &lookup)
            .with_params(ExecutorParams::default().with_readiness(readiness));
        let mut plan = nat_plan();

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.errors[0].contains("NAT gateway nat-1 not ready"));
        // t = 0, 15, 30, 45, 60
        assert_eq!(server.calls_to("describe-nat-gateways").len(), 5);
        // The id is mapped before the wait; state is not recorded
        assert_eq!(executor.mapping().get("step-nat").as_deref(), Some("nat-1"));
        assert!(server.calls_to(ADD_RESOURCE_TOOL).is_empty());
    }

    // ==================== Retrieval ====================

    #[tokio::test]
    async fn test_availability_zones_mapped_by_index() {
        let (_, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            retrieve("azs", "available_azs").with_param("max_azs", 2),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        let out = output(&run, "azs");
        assert_eq!(out["all_zones"], json!(["us-west-2a", "us-west-2b"]));
        assert_eq!(out["count"], 2);
        assert!(out["retrieved_at"].is_string());
        assert_eq!(executor.mapping().get("azs").as_deref(), Some("us-west-2a"));
        assert_eq!(executor.mapping().get("azs.1").as_deref(), Some("us-west-2b"));
        assert!(!executor.mapping().contains("azs.2"));
    }

    #[tokio::test]
    async fn test_default_subnet_exposes_vpc_to_later_steps() {
        let (server, _, executor) =
            setup(ScriptedServer::new().reply("create-security-group", json!({"groupId": "sg-1"})));
        let mut plan = ExecutionPlan::new(vec![
            retrieve("step-subnet", "default_subnet"),
            create("step-sg", "create-security-group")
                .with_tool_param("vpcId", "{{step-subnet.vpcId}}")
                .with_tool_param("groupName", "web")
                .with_param("purpose", "web servers"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        let args = &server.calls_to("create-security-group")[0];
        assert_eq!(args["vpcId"], "vpc-default");
        assert_eq!(args["description"], "Security group for web servers");
        assert_eq!(
            executor.mapping().get("step-subnet").as_deref(),
            Some("subnet-default")
        );
        assert_eq!(executor.mapping().get("step-sg").as_deref(), Some("sg-1"));
    }

    #[tokio::test]
    async fn test_subnets_in_vpc_from_earlier_step() {
        let (_, lookup, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![
            retrieve("step-vpc", "default_vpc"),
            retrieve("subnets", "subnets_in_vpc").with_param("vpc_id_step", "step-vpc"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        assert!(lookup.calls().contains(&"subnets_in_vpc:vpc-default".to_string()));
        assert_eq!(executor.mapping().get("subnets.1").as_deref(), Some("subnet-b"));
        assert_eq!(output(&run, "subnets")["count"], 2);
    }

    #[tokio::test]
    async fn test_existing_vpc_falls_back_to_listing() {
        let server = Arc::new(ScriptedServer::new());
        let lookup = Arc::new(StubLookup::new().without_default_vpc(vec![VpcInfo {
            vpc_id: "vpc-listed".to_string(),
            is_default: false,
        }]));
        let executor = executor(&server, &lookup);
        let mut plan = ExecutionPlan::new(vec![
            PlanStep::new("vpc", StepAction::Retrieve).with_name("Find the VPC"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        assert_eq!(output(&run, "vpc")["value"], "vpc-listed");
        assert_eq!(output(&run, "vpc")["is_default"], false);
    }

    #[tokio::test]
    async fn test_load_balancer_subnets_use_default_vpc() {
        let (_, lookup, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![retrieve("alb-subnets", "select_subnets_for_alb")]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success());
        assert!(
            lookup
                .calls()
                .contains(&"select_subnets_for_alb:vpc-default:internet-facing".to_string())
        );
        assert_eq!(
            executor.mapping().get("alb-subnets.1").as_deref(),
            Some("subnet-pub-b")
        );
    }

    #[tokio::test]
    async fn test_step_reference_retrieval() {
        let (_, lookup, executor) = setup(ScriptedServer::new());
        executor.mapping().set("step-alb", "arn:aws:elasticloadbalancing:alb/web");
        executor.mapping().set("step-db", "app-db");
        let mut plan = ExecutionPlan::new(vec![
            retrieve("alb-arn", "load_balancer_arn").with_param("step_ref", "step-alb"),
            retrieve("db-endpoint", "rds_endpoint").with_param("step_ref", "{{step-db}}"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        let alb = output(&run, "alb-arn");
        assert_eq!(alb["value"], "arn:aws:elasticloadbalancing:alb/web");
        assert_eq!(alb["loadBalancerArn"], alb["value"]);
        assert_eq!(alb["source"], "step_reference");
        assert_eq!(
            output(&run, "db-endpoint")["endpoint"],
            "app-db.abc123.us-west-2.rds.amazonaws.com"
        );
        assert_eq!(lookup.calls(), vec!["db_endpoint:app-db"]);
    }

    #[tokio::test]
    async fn test_managed_state_lookup() {
        let state = json!({"managed_state": {"resources": {
            "web-vpc": {"type": "vpc", "properties": {"mcp_response": {"vpcId": "vpc-777"}}},
            "step-subnet": {"type": "step_reference", "properties": {"mcp_response": {"subnetId": "subnet-5", "vpcId": "vpc-777"}}}
        }}});
        let (_, _, executor) = setup(ScriptedServer::new().with_state(state));
        let mut plan = ExecutionPlan::new(vec![
            retrieve("found-vpc", "vpc_id").with_param("resource_name", "web-vpc"),
            retrieve("found-subnet", "subnet_id").with_param("resource_id", "step-subnet"),
        ]);

        let run = executor.execute(&mut plan).await;

        assert!(run.is_success(), "errors: {:?}", run.errors);
        assert_eq!(executor.mapping().get("found-vpc").as_deref(), Some("vpc-777"));
        let subnet = output(&run, "found-subnet");
        assert_eq!(subnet["value"], "subnet-5");
        assert_eq!(subnet["resource_type"], "subnet");
        assert_eq!(subnet["source"], "managed_state");
    }

    #[tokio::test]
    async fn test_unsupported_value_type() {
        let (_, _, executor) = setup(ScriptedServer::new());
        let mut plan = ExecutionPlan::new(vec![retrieve("s1", "warp_drive")]);

        let run = executor.execute(&mut plan).await;

        assert_eq!(run.errors, vec!["Step s1 failed: Unsupported value type: warp_drive"]);
    }
}
