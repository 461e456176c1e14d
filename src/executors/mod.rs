//! Built-in command executors
//!
//! One executor per command type. Each extracts and validates its payload
//! synchronously, then applies the side effect on a spawned task -- the
//! submitting request thread never waits on the actuation -- and reports
//! the terminal outcome through the router's completion token.
//!
//! Executors therefore require a running tokio runtime.

use crate::model::{Command, FeatureFlags};
use crate::router::{CommandCompletion, CommandExecutor, CommandRouter};
use crate::world::SimWorld;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// `RESET_FUSE {circuitId}` -- reset a tripped power-circuit fuse.
pub struct ResetFuseExecutor;

impl CommandExecutor<SimWorld> for ResetFuseExecutor {
    fn command_type(&self) -> &'static str {
        "RESET_FUSE"
    }

    fn execute(&self, command: &Command, world: Arc<SimWorld>, completion: CommandCompletion) {
        let Some(payload) = command.payload.as_ref() else {
            completion.fail("Missing payload");
            return;
        };
        let Some(circuit_id) = payload.get("circuitId").and_then(Value::as_i64) else {
            completion.fail("Missing or invalid circuitId in payload");
            return;
        };

        tokio::spawn(async move {
            match world.reset_fuse(circuit_id) {
                None => {
                    warn!(circuit = circuit_id, "circuit not found");
                    completion.fail(format!("Power circuit {circuit_id} not found"));
                }
                Some(false) => {
                    // Not tripped -- succeed silently (idempotent).
                    info!(circuit = circuit_id, "fuse not tripped, no-op");
                    completion.succeed(Some(json!({"message": "Fuse was not tripped"})));
                }
                Some(true) => {
                    info!(circuit = circuit_id, "fuse reset");
                    completion
                        .succeed(Some(json!({"message": format!("Reset fuse on circuit {circuit_id}")})));
                }
            }
        });
    }
}

/// `TOGGLE_BUILDING {buildingId, enabled}` -- pause or resume one building.
pub struct ToggleBuildingExecutor;

impl CommandExecutor<SimWorld> for ToggleBuildingExecutor {
    fn command_type(&self) -> &'static str {
        "TOGGLE_BUILDING"
    }

    fn execute(&self, command: &Command, world: Arc<SimWorld>, completion: CommandCompletion) {
        let Some(payload) = command.payload.as_ref() else {
            completion.fail("Missing payload");
            return;
        };
        let Some(building_id) = payload.get("buildingId").and_then(Value::as_str) else {
            completion.fail("Missing buildingId in payload");
            return;
        };
        let Some(enabled) = payload.get("enabled").and_then(Value::as_bool) else {
            completion.fail("Missing enabled in payload");
            return;
        };

        let building_id = building_id.to_string();
        tokio::spawn(async move {
            if !world.set_machine_enabled(&building_id, enabled) {
                completion.fail(format!("Building not found: {building_id}"));
                return;
            }
            let verb = if enabled { "Enabled" } else { "Disabled" };
            info!(building = %building_id, enabled, "building toggled");
            completion.succeed(Some(json!({"message": format!("{verb} building {building_id}")})));
        });
    }
}

/// `SET_RECIPE {machineId, recipeId}` -- change a manufacturer's recipe.
pub struct SetRecipeExecutor;

impl CommandExecutor<SimWorld> for SetRecipeExecutor {
    fn command_type(&self) -> &'static str {
        "SET_RECIPE"
    }

    fn execute(&self, command: &Command, world: Arc<SimWorld>, completion: CommandCompletion) {
        let Some(payload) = command.payload.as_ref() else {
            completion.fail("Missing payload");
            return;
        };
        let Some(machine_id) = payload.get("machineId").and_then(Value::as_str) else {
            completion.fail("Missing machineId in payload");
            return;
        };
        let Some(recipe_id) = payload.get("recipeId").and_then(Value::as_str) else {
            completion.fail("Missing recipeId in payload");
            return;
        };

        let machine_id = machine_id.to_string();
        let recipe_id = recipe_id.to_string();
        tokio::spawn(async move {
            if !world.manufacturer_exists(&machine_id) {
                completion.fail(format!("Manufacturer not found: {machine_id}"));
                return;
            }
            let Some(recipe) = world.resolve_recipe(&recipe_id) else {
                completion.fail(format!("Recipe not found: {recipe_id}"));
                return;
            };
            if !world.set_recipe(&machine_id, recipe) {
                completion.fail(format!("Manufacturer not found: {machine_id}"));
                return;
            }
            info!(machine = %machine_id, recipe = %recipe_id, "recipe set");
            completion
                .succeed(Some(json!({"message": format!("Set recipe {recipe_id} on {machine_id}")})));
        });
    }
}

/// `SET_OVERCLOCK {machineId, clockPercent}` -- change a machine's clock
/// speed. Valid range 0–250 percent.
pub struct SetOverclockExecutor;

impl CommandExecutor<SimWorld> for SetOverclockExecutor {
    fn command_type(&self) -> &'static str {
        "SET_OVERCLOCK"
    }

    fn execute(&self, command: &Command, world: Arc<SimWorld>, completion: CommandCompletion) {
        let Some(payload) = command.payload.as_ref() else {
            completion.fail("Missing payload");
            return;
        };
        let Some(machine_id) = payload.get("machineId").and_then(Value::as_str) else {
            completion.fail("Missing machineId in payload");
            return;
        };
        let Some(clock_percent) = payload.get("clockPercent").and_then(Value::as_f64) else {
            completion.fail("Missing clockPercent in payload");
            return;
        };
        if !(0.0..=250.0).contains(&clock_percent) {
            completion.fail(format!(
                "clockPercent must be between 0 and 250, got {clock_percent}"
            ));
            return;
        }

        let machine_id = machine_id.to_string();
        tokio::spawn(async move {
            if !world.set_clock_percent(&machine_id, clock_percent) {
                completion.fail(format!("Building not found: {machine_id}"));
                return;
            }
            info!(machine = %machine_id, clock_percent, "overclock set");
            completion.succeed(Some(
                json!({"message": format!("Set overclock to {clock_percent}% on {machine_id}")}),
            ));
        });
    }
}

/// `TOGGLE_GENERATOR_GROUP {groupId, enabled}` -- pause or resume every
/// generator of one class.
pub struct ToggleGeneratorGroupExecutor;

impl CommandExecutor<SimWorld> for ToggleGeneratorGroupExecutor {
    fn command_type(&self) -> &'static str {
        "TOGGLE_GENERATOR_GROUP"
    }

    fn execute(&self, command: &Command, world: Arc<SimWorld>, completion: CommandCompletion) {
        let Some(payload) = command.payload.as_ref() else {
            completion.fail("Missing payload");
            return;
        };
        let Some(group_id) = payload.get("groupId").and_then(Value::as_str) else {
            completion.fail("Missing groupId in payload");
            return;
        };
        let Some(enabled) = payload.get("enabled").and_then(Value::as_bool) else {
            completion.fail("Missing enabled in payload");
            return;
        };

        let group_id = group_id.to_string();
        tokio::spawn(async move {
            let count = world.toggle_generator_group(&group_id, enabled);
            if count == 0 {
                completion.fail(format!("No generators found for group: {group_id}"));
                return;
            }
            let verb = if enabled { "Enabled" } else { "Disabled" };
            info!(group = %group_id, enabled, count, "generator group toggled");
            completion.succeed(Some(json!({
                "message": format!("{verb} {count} generators in group {group_id}"),
                "count": count,
            })));
        });
    }
}

/// Register the bundled executors, honoring the per-type enable flags: a
/// disabled type is simply never registered, so submissions of it fail
/// admission as unknown.
pub fn register_builtin_executors(router: &CommandRouter<SimWorld>, features: &FeatureFlags) {
    if features.reset_fuse {
        router.register_executor(Arc::new(ResetFuseExecutor));
    }
    if features.toggle_building {
        router.register_executor(Arc::new(ToggleBuildingExecutor));
    }
    if features.set_recipe {
        router.register_executor(Arc::new(SetRecipeExecutor));
    }
    if features.set_overclock {
        router.register_executor(Arc::new(SetOverclockExecutor));
    }
    if features.toggle_generator_group {
        router.register_executor(Arc::new(ToggleGeneratorGroupExecutor));
    }
}
