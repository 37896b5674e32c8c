//! Bedrock AgentCore control plane: memory, gateway, gateway target, runtime
//!
//! Request bodies arrive as JSON from the resource spec and are converted to
//! the SDK's typed shapes here, so a malformed spec fails before any call.

use crate::error::{AwsError, Result};
use crate::sdk::{conflicting, field, member, missing, required_field, sdk_failure};
use aws_config::SdkConfig;
use aws_sdk_bedrockagentcorecontrol::Client;
use aws_sdk_bedrockagentcorecontrol::error::ProvideErrorMetadata;
use aws_sdk_bedrockagentcorecontrol::types::{
    AgentRuntimeArtifact, AuthorizerConfiguration, AuthorizerType, ContainerConfiguration,
    CredentialProviderConfiguration, CredentialProviderType, CustomJwtAuthorizerConfiguration,
    GatewayProtocolType, McpLambdaTargetConfiguration, McpTargetConfiguration, MemoryStrategyInput,
    NetworkConfiguration, NetworkMode, SchemaDefinition, SchemaType,
    SemanticMemoryStrategyInput, SummaryMemoryStrategyInput, TargetConfiguration, ToolDefinition,
    ToolSchema, UserPreferenceMemoryStrategyInput,
};
use serde_json::Value;
use std::collections::HashMap;

/// Configuration for creating a memory store
#[derive(Debug, Clone)]
pub struct CreateMemoryConfig {
    pub name: String,
    pub description: String,
    pub event_expiry_days: i32,
    pub strategies: Value,
}

/// Configuration for creating a gateway
#[derive(Debug, Clone)]
pub struct CreateGatewayConfig {
    pub name: String,
    pub role_arn: String,
    pub authorizer: Value,
    pub description: String,
}

/// Configuration for attaching a gateway target
#[derive(Debug, Clone)]
pub struct CreateTargetConfig {
    pub gateway_id: String,
    pub name: String,
    pub target_configuration: Value,
    pub credential_providers: Value,
}

/// Configuration for creating an agent runtime
#[derive(Debug, Clone)]
pub struct CreateRuntimeConfig {
    pub name: String,
    pub container_uri: String,
    pub role_arn: String,
    pub authorizer: Value,
    pub environment: Value,
}

#[derive(Debug, Clone)]
pub struct MemoryInfo {
    pub id: String,
    pub arn: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
}

impl MemoryInfo {
    /// Memory ids are `<name>-<suffix>`; summaries carry no name
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self
                .id
                .rsplit_once('-')
                .map(|(name, _)| name)
                .unwrap_or(&self.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayInfo {
    pub gateway_id: String,
    pub gateway_arn: Option<String>,
    pub gateway_url: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub target_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    pub agent_runtime_id: String,
    pub agent_runtime_arn: Option<String>,
    pub agent_runtime_name: Option<String>,
    pub status: Option<String>,
}

/// AgentCore control plane client
pub struct AgentCoreClient {
    client: Client,
}

impl AgentCoreClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    // ---- memory ----

    pub async fn get_memory(&self, id: &str) -> Result<MemoryInfo> {
        let out = self
            .client
            .get_memory()
            .memory_id(id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        let memory = member(out.memory(), "memory")?;
        Ok(MemoryInfo {
            id: required_field(memory.id(), "memory id")?,
            arn: field(memory.arn()),
            name: field(memory.name()),
            status: field(memory.status()),
        })
    }

    pub async fn list_memories(&self) -> Result<Vec<MemoryInfo>> {
        let mut memories = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_memories()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_failure)?;

            for summary in out.memories() {
                if let Some(id) = field(summary.id()) {
                    memories.push(MemoryInfo {
                        id,
                        arn: field(summary.arn()),
                        name: None,
                        status: field(summary.status()),
                    });
                }
            }

            next_token = out.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(memories)
    }

    pub async fn create_memory(&self, config: &CreateMemoryConfig) -> Result<MemoryInfo> {
        let out = self
            .client
            .create_memory()
            .name(&config.name)
            .description(&config.description)
            .event_expiry_duration(config.event_expiry_days)
            .set_memory_strategies(Some(memory_strategies(&config.strategies)?))
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.code() == Some("ConflictException")))?;
        let memory = member(out.memory(), "memory")?;
        Ok(MemoryInfo {
            id: required_field(memory.id(), "memory id")?,
            arn: field(memory.arn()),
            name: Some(config.name.clone()),
            status: field(memory.status()),
        })
    }

    pub async fn delete_memory(&self, id: &str) -> Result<()> {
        self.client
            .delete_memory()
            .memory_id(id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }

    // ---- gateway ----

    pub async fn get_gateway(&self, id: &str) -> Result<GatewayInfo> {
        let out = self
            .client
            .get_gateway()
            .gateway_identifier(id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(GatewayInfo {
            gateway_id: required_field(out.gateway_id(), "gateway id")?,
            gateway_arn: field(out.gateway_arn()),
            gateway_url: field(out.gateway_url()),
            name: field(out.name()),
            status: field(out.status()),
        })
    }

    /// Gateway summaries; they carry no URL
    pub async fn list_gateways(&self) -> Result<Vec<GatewayInfo>> {
        let mut gateways = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_gateways()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_failure)?;

            for summary in out.items() {
                if let Some(gateway_id) = field(summary.gateway_id()) {
                    gateways.push(GatewayInfo {
                        gateway_id,
                        gateway_arn: None,
                        gateway_url: None,
                        name: field(summary.name()),
                        status: field(summary.status()),
                    });
                }
            }

            next_token = out.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(gateways)
    }

    pub async fn create_gateway(&self, config: &CreateGatewayConfig) -> Result<GatewayInfo> {
        let out = self
            .client
            .create_gateway()
            .name(&config.name)
            .role_arn(&config.role_arn)
            .protocol_type(GatewayProtocolType::from("MCP"))
            .authorizer_type(AuthorizerType::from("CUSTOM_JWT"))
            .authorizer_configuration(authorizer(&config.authorizer)?)
            .description(&config.description)
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.is_conflict_exception()))?;
        Ok(GatewayInfo {
            gateway_id: required_field(out.gateway_id(), "gateway id")?,
            gateway_arn: field(out.gateway_arn()),
            gateway_url: field(out.gateway_url()),
            name: field(out.name()),
            status: field(out.status()),
        })
    }

    pub async fn delete_gateway(&self, id: &str) -> Result<()> {
        self.client
            .delete_gateway()
            .gateway_identifier(id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }

    // ---- gateway target ----

    pub async fn get_gateway_target(
        &self,
        gateway_id: &str,
        target_id: &str,
    ) -> Result<TargetInfo> {
        let out = self
            .client
            .get_gateway_target()
            .gateway_identifier(gateway_id)
            .target_id(target_id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(TargetInfo {
            target_id: required_field(out.target_id(), "target id")?,
            name: field(out.name()),
            status: field(out.status()),
        })
    }

    pub async fn list_gateway_targets(&self, gateway_id: &str) -> Result<Vec<TargetInfo>> {
        let mut targets = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_gateway_targets()
                .gateway_identifier(gateway_id)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;

            for summary in out.items() {
                if let Some(target_id) = field(summary.target_id()) {
                    targets.push(TargetInfo {
                        target_id,
                        name: field(summary.name()),
                        status: field(summary.status()),
                    });
                }
            }

            next_token = out.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(targets)
    }

    pub async fn create_gateway_target(&self, config: &CreateTargetConfig) -> Result<TargetInfo> {
        let out = self
            .client
            .create_gateway_target()
            .gateway_identifier(&config.gateway_id)
            .name(&config.name)
            .target_configuration(target_configuration(&config.target_configuration)?)
            .set_credential_provider_configurations(Some(credential_providers(
                &config.credential_providers,
            )?))
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.is_conflict_exception()))?;
        Ok(TargetInfo {
            target_id: required_field(out.target_id(), "target id")?,
            name: field(out.name()),
            status: field(out.status()),
        })
    }

    pub async fn delete_gateway_target(&self, gateway_id: &str, target_id: &str) -> Result<()> {
        self.client
            .delete_gateway_target()
            .gateway_identifier(gateway_id)
            .target_id(target_id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }

    // ---- runtime ----

    pub async fn get_agent_runtime(&self, id: &str) -> Result<RuntimeInfo> {
        let out = self
            .client
            .get_agent_runtime()
            .agent_runtime_id(id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(RuntimeInfo {
            agent_runtime_id: required_field(out.agent_runtime_id(), "agent runtime id")?,
            agent_runtime_arn: field(out.agent_runtime_arn()),
            agent_runtime_name: field(out.agent_runtime_name()),
            status: field(out.status()),
        })
    }

    pub async fn list_agent_runtimes(&self) -> Result<Vec<RuntimeInfo>> {
        let mut runtimes = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let out = self
                .client
                .list_agent_runtimes()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(sdk_failure)?;

            for runtime in out.agent_runtimes() {
                if let Some(agent_runtime_id) = field(runtime.agent_runtime_id()) {
                    runtimes.push(RuntimeInfo {
                        agent_runtime_id,
                        agent_runtime_arn: field(runtime.agent_runtime_arn()),
                        agent_runtime_name: field(runtime.agent_runtime_name()),
                        status: field(runtime.status()),
                    });
                }
            }

            next_token = out.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(runtimes)
    }

    pub async fn create_agent_runtime(&self, config: &CreateRuntimeConfig) -> Result<RuntimeInfo> {
        let artifact = AgentRuntimeArtifact::ContainerConfiguration(
            ContainerConfiguration::builder()
                .container_uri(&config.container_uri)
                .build()?,
        );
        let network = NetworkConfiguration::builder()
            .network_mode(NetworkMode::from("PUBLIC"))
            .build()?;

        let out = self
            .client
            .create_agent_runtime()
            .agent_runtime_name(&config.name)
            .agent_runtime_artifact(artifact)
            .role_arn(&config.role_arn)
            .network_configuration(network)
            .authorizer_configuration(authorizer(&config.authorizer)?)
            .set_environment_variables(Some(environment(&config.environment)?))
            .send()
            .await
            .map_err(|e| conflicting(e, |e| e.is_conflict_exception()))?;
        Ok(RuntimeInfo {
            agent_runtime_id: required_field(out.agent_runtime_id(), "agent runtime id")?,
            agent_runtime_arn: field(out.agent_runtime_arn()),
            agent_runtime_name: Some(config.name.clone()),
            status: field(out.status()),
        })
    }

    pub async fn delete_agent_runtime(&self, id: &str) -> Result<()> {
        self.client
            .delete_agent_runtime()
            .agent_runtime_id(id)
            .send()
            .await
            .map_err(|e| missing(e, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }
}

// ---- JSON → SDK shapes ----

fn invalid(message: impl Into<String>) -> AwsError {
    AwsError::InvalidSpec(message.into())
}

fn str_at<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("{} requires string `{}`", context, key)))
}

fn strings_at(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `[{"<kind>MemoryStrategy": {"name", "namespaces", "description"?}}]`
pub(crate) fn memory_strategies(value: &Value) -> Result<Vec<MemoryStrategyInput>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid("memory strategies must be an array"))?;

    let mut strategies = Vec::with_capacity(items.len());
    for item in items {
        let (kind, body) = item
            .as_object()
            .and_then(|object| object.iter().next())
            .ok_or_else(|| invalid("memory strategy must be a single-key object"))?;
        let name = str_at(body, "name", kind)?;
        let namespaces = Some(strings_at(body, "namespaces"));
        let description = body.get("description").and_then(Value::as_str);

        let strategy = match kind.as_str() {
            "userPreferenceMemoryStrategy" => MemoryStrategyInput::UserPreferenceMemoryStrategy(
                UserPreferenceMemoryStrategyInput::builder()
                    .name(name)
                    .set_namespaces(namespaces)
                    .set_description(description.map(str::to_string))
                    .build()?,
            ),
            "semanticMemoryStrategy" => MemoryStrategyInput::SemanticMemoryStrategy(
                SemanticMemoryStrategyInput::builder()
                    .name(name)
                    .set_namespaces(namespaces)
                    .set_description(description.map(str::to_string))
                    .build()?,
            ),
            "summaryMemoryStrategy" => MemoryStrategyInput::SummaryMemoryStrategy(
                SummaryMemoryStrategyInput::builder()
                    .name(name)
                    .set_namespaces(namespaces)
                    .set_description(description.map(str::to_string))
                    .build()?,
            ),
            other => return Err(invalid(format!("unknown memory strategy `{}`", other))),
        };
        strategies.push(strategy);
    }
    Ok(strategies)
}

/// `{"customJWTAuthorizer": {"discoveryUrl", "allowedClients"}}`
pub(crate) fn authorizer(value: &Value) -> Result<AuthorizerConfiguration> {
    let jwt = value
        .get("customJWTAuthorizer")
        .ok_or_else(|| invalid("authorizer requires `customJWTAuthorizer`"))?;
    let config = CustomJwtAuthorizerConfiguration::builder()
        .discovery_url(str_at(jwt, "discoveryUrl", "customJWTAuthorizer")?)
        .set_allowed_clients(Some(strings_at(jwt, "allowedClients")))
        .build()?;
    Ok(AuthorizerConfiguration::CustomJwtAuthorizer(config))
}

/// `{"mcp": {"lambda": {"lambdaArn", "toolSchema": {"inlinePayload": [...]}}}}`
pub(crate) fn target_configuration(value: &Value) -> Result<TargetConfiguration> {
    let lambda = value
        .get("mcp")
        .and_then(|mcp| mcp.get("lambda"))
        .ok_or_else(|| invalid("target configuration requires `mcp.lambda`"))?;
    let tools = lambda
        .get("toolSchema")
        .and_then(|schema| schema.get("inlinePayload"))
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("lambda target requires `toolSchema.inlinePayload`"))?;

    let definitions = tools.iter().map(tool_definition).collect::<Result<Vec<_>>>()?;
    let config = McpLambdaTargetConfiguration::builder()
        .lambda_arn(str_at(lambda, "lambdaArn", "lambda target")?)
        .tool_schema(ToolSchema::InlinePayload(definitions))
        .build()?;
    Ok(TargetConfiguration::Mcp(McpTargetConfiguration::Lambda(config)))
}

fn tool_definition(value: &Value) -> Result<ToolDefinition> {
    let name = str_at(value, "name", "tool")?;
    let input_schema = value
        .get("inputSchema")
        .ok_or_else(|| invalid(format!("tool {} requires `inputSchema`", name)))?;
    Ok(ToolDefinition::builder()
        .name(name)
        .description(str_at(value, "description", name)?)
        .input_schema(schema_definition(input_schema)?)
        .build()?)
}

fn schema_definition(value: &Value) -> Result<SchemaDefinition> {
    if value.get("items").is_some() {
        return Err(invalid("array item schemas are not supported in tool schemas"));
    }

    let mut builder = SchemaDefinition::builder()
        .r#type(SchemaType::from(str_at(value, "type", "schema")?))
        .set_description(value.get("description").and_then(Value::as_str).map(str::to_string));
    if let Some(properties) = value.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            builder = builder.properties(name, schema_definition(property)?);
        }
    }
    for name in strings_at(value, "required") {
        builder = builder.required(name);
    }
    Ok(builder.build()?)
}

/// `[{"credentialProviderType": "GATEWAY_IAM_ROLE"}]`
pub(crate) fn credential_providers(value: &Value) -> Result<Vec<CredentialProviderConfiguration>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid("credential providers must be an array"))?;
    items
        .iter()
        .map(|item| {
            let kind = str_at(item, "credentialProviderType", "credential provider")?;
            Ok(CredentialProviderConfiguration::builder()
                .credential_provider_type(CredentialProviderType::from(kind))
                .build()?)
        })
        .collect()
}

/// Flat string map of runtime environment variables
pub(crate) fn environment(value: &Value) -> Result<HashMap<String, String>> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid("runtime environment must be an object"))?;
    object
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key.clone(), s.clone())),
            Value::Number(n) => Ok((key.clone(), n.to_string())),
            Value::Bool(b) => Ok((key.clone(), b.to_string())),
            _ => Err(invalid(format!("environment variable {} must be a scalar", key))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_display_name_from_id() {
        let summary = MemoryInfo {
            id: "CustomerSupportMemory-Xy12Ab34Cd".into(),
            arn: None,
            name: None,
            status: Some("ACTIVE".into()),
        };
        assert_eq!(summary.display_name(), "CustomerSupportMemory");
    }

    #[test]
    fn test_memory_strategies() {
        let strategies = memory_strategies(&json!([
            {
                "userPreferenceMemoryStrategy": {
                    "name": "CustomerPreferences",
                    "namespaces": ["support/customer/{actorId}/preferences"]
                }
            },
            {
                "semanticMemoryStrategy": {
                    "name": "CustomerSupportSemantic",
                    "namespaces": ["support/customer/{actorId}/semantic"]
                }
            }
        ]))
        .unwrap();

        assert_eq!(strategies.len(), 2);
        match &strategies[0] {
            MemoryStrategyInput::UserPreferenceMemoryStrategy(s) => {
                assert_eq!(field(s.name()).as_deref(), Some("CustomerPreferences"));
                assert_eq!(s.namespaces(), ["support/customer/{actorId}/preferences"]);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
        assert!(matches!(
            strategies[1],
            MemoryStrategyInput::SemanticMemoryStrategy(_)
        ));
    }

    #[test]
    fn test_unknown_memory_strategy_is_rejected() {
        let err = memory_strategies(&json!([{ "episodicMemoryStrategy": { "name": "x" } }]))
            .unwrap_err();
        assert!(matches!(err, AwsError::InvalidSpec(_)));
    }

    #[test]
    fn test_jwt_authorizer() {
        let config = authorizer(&json!({
            "customJWTAuthorizer": {
                "allowedClients": ["client-1"],
                "discoveryUrl": "https://idp.example/pool/.well-known/openid-configuration"
            }
        }))
        .unwrap();
        match config {
            AuthorizerConfiguration::CustomJwtAuthorizer(jwt) => {
                assert_eq!(jwt.allowed_clients(), ["client-1"]);
                assert!(
                    field(jwt.discovery_url())
                        .is_some_and(|url| url.ends_with("openid-configuration"))
                );
            }
            other => panic!("unexpected authorizer {:?}", other),
        }

        assert!(authorizer(&json!({ "customJWTAuthorizer": {} })).is_err());
    }

    #[test]
    fn test_lambda_target_with_inline_schema() {
        let config = target_configuration(&json!({
            "mcp": {
                "lambda": {
                    "lambdaArn": "arn:aws:lambda:us-east-1:123456789012:function:support-tools",
                    "toolSchema": {
                        "inlinePayload": [{
                            "name": "check_warranty_status",
                            "description": "Check the warranty status of a product",
                            "inputSchema": {
                                "type": "object",
                                "properties": {
                                    "serial_number": { "type": "string" },
                                    "max_results": { "type": "integer" }
                                },
                                "required": ["serial_number"]
                            }
                        }]
                    }
                }
            }
        }))
        .unwrap();

        let TargetConfiguration::Mcp(McpTargetConfiguration::Lambda(lambda)) = config else {
            panic!("expected an MCP lambda target");
        };
        assert_eq!(
            field(lambda.lambda_arn()).as_deref(),
            Some("arn:aws:lambda:us-east-1:123456789012:function:support-tools")
        );
        let ToolSchema::InlinePayload(tools) = member(lambda.tool_schema(), "tool schema").unwrap()
        else {
            panic!("expected an inline tool schema");
        };
        assert_eq!(tools.len(), 1);

        let input = member(tools[0].input_schema(), "input schema").unwrap();
        assert_eq!(field(input.r#type()).as_deref(), Some("object"));
        assert_eq!(input.required(), ["serial_number"]);
        let properties = member(input.properties(), "properties").unwrap();
        assert_eq!(
            field(properties["max_results"].r#type()).as_deref(),
            Some("integer")
        );
    }

    #[test]
    fn test_target_without_lambda_is_rejected() {
        let err = target_configuration(&json!({ "mcp": { "openApiSchema": {} } })).unwrap_err();
        assert!(matches!(err, AwsError::InvalidSpec(_)));
    }

    #[test]
    fn test_credential_providers_and_environment() {
        let providers =
            credential_providers(&json!([{ "credentialProviderType": "GATEWAY_IAM_ROLE" }]))
                .unwrap();
        assert_eq!(
            field(providers[0].credential_provider_type()).as_deref(),
            Some("GATEWAY_IAM_ROLE")
        );

        let env = environment(&json!({
            "GATEWAY_URL": "https://gw.example/mcp",
            "MAX_TURNS": 8
        }))
        .unwrap();
        assert_eq!(env["GATEWAY_URL"], "https://gw.example/mcp");
        assert_eq!(env["MAX_TURNS"], "8");

        assert!(environment(&json!({ "NESTED": { "a": 1 } })).is_err());
    }
}
