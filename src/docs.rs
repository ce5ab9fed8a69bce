use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authz;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::teams::create_team,
		routes::teams::get_team,
		routes::teams::update_settings,
		routes::teams::update_workflow,
		routes::teams::create_project,
		routes::teams::permissions,
		routes::members::join_team,
		routes::members::add_member,
		routes::members::save_role,
		routes::members::remove_member,
		routes::members::effective_role,
		routes::videos::create_video,
		routes::videos::delete_video,
		routes::videos::update_language,
		routes::tasks::eligible_tasks,
		routes::tasks::create_task,
		routes::tasks::assign_task,
		routes::tasks::complete_task,
		routes::tasks::delete_task
	),
	components(
		schemas(
			routes::health::HealthResponse,
			authz::Role,
			authz::policy::VideoPolicy,
			authz::policy::MembershipPolicy,
			authz::policy::TaskAssignPolicy,
			authz::policy::EditPolicy,
			authz::policy::ReviewPolicy,
			authz::policy::ApprovePolicy,
			authz::EligibleTasks,
			models::team::Team,
			models::team::Project,
			models::team::Workflow,
			models::team::TeamDetail,
			models::team::PermissionFlags,
			models::team::TeamCreateRequest,
			models::team::TeamSettingsRequest,
			models::team::WorkflowRequest,
			models::team::ProjectCreateRequest,
			models::member::Membership,
			models::member::Narrowing,
			models::member::MemberAddRequest,
			models::member::RoleChangeRequest,
			models::member::EffectiveRoleResponse,
			models::video::TeamVideo,
			models::video::SubtitleLanguage,
			models::video::VideoCreateRequest,
			models::video::SubtitleLanguageRequest,
			models::task::Task,
			models::task::TaskType,
			models::task::ReviewOutcome,
			models::task::TaskCreateRequest,
			models::task::TaskAssignRequest,
			models::task::TaskCompleteRequest
		)
	),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Teams", description = "Teams, settings, workflows and permission flags"),
		(name = "Members", description = "Memberships, roles and narrowings"),
		(name = "Videos", description = "Team videos and subtitle language state"),
		(name = "Tasks", description = "Task eligibility and task lifecycle")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	add_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else { return; };

	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else { return; };

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(schemes) = schemes.as_object_mut() else { return; };

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn add_examples(doc: &mut Value) {
	let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) else { return; };

	for item in paths.values_mut() {
		let Some(operations) = item.as_object_mut() else { continue; };
		for operation in operations.values_mut() {
			apply_request_examples(operation);
		}
	}
}

fn apply_request_examples(operation: &mut Value) {
	let Some(request_body) = operation.get_mut("requestBody") else { return; };
	let Some(content) = request_body.get_mut("content").and_then(Value::as_object_mut) else { return; };
	let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else { return; };
	let Some(schema) = app_json.get("schema").and_then(Value::as_object) else { return; };
	let Some(reference) = schema.get("$ref").and_then(Value::as_str) else { return; };

	let example = match reference {
		"#/components/schemas/TeamCreateRequest" => Some(json!({
			"name": "Volunteer Translators",
			"slug": "volunteers"
		})),
		"#/components/schemas/TeamSettingsRequest" => Some(json!({
			"video_policy": "managers",
			"task_assign_policy": "managers",
			"translate_policy": "members",
			"blocked_languages": ["de"]
		})),
		"#/components/schemas/WorkflowRequest" => Some(json!({
			"project_id": null,
			"review_enabled": true,
			"review_allowed": "peer",
			"approve_enabled": true,
			"approve_allowed": "managers"
		})),
		"#/components/schemas/RoleChangeRequest" => Some(json!({
			"role": "manager",
			"projects": [],
			"languages": ["en", "fr"]
		})),
		"#/components/schemas/MemberAddRequest" => Some(json!({
			"user_id": "11111111-1111-1111-1111-111111111111",
			"role": "contributor"
		})),
		"#/components/schemas/TaskCreateRequest" => Some(json!({
			"task_type": "translate",
			"language": "fr"
		})),
		"#/components/schemas/TaskCompleteRequest" => Some(json!({
			"review_outcome": "accepted"
		})),
		_ => None,
	};

	if let Some(example) = example {
		app_json.insert("example".to_string(), example);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{port}");

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_team_routes_and_bearer_scheme() {
		let doc = build_openapi(8000).unwrap();
		let value = serde_json::to_value(&doc).unwrap();

		assert!(value["paths"]["/teams/{team_id}/members/{user_id}/role"]["put"].is_object());
		assert!(value["paths"]["/teams/{team_id}/videos/{video_id}/eligible-tasks"]["get"].is_object());
		assert_eq!(value["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
		assert_eq!(value["servers"][0]["url"], "http://localhost:8000");
	}
}
