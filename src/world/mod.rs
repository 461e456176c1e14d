//! Simulated actuation backend
//!
//! An in-process stand-in for the external plant the gateway actuates:
//! power circuits with trippable fuses, machines with enable/recipe/clock
//! state, and generator groups keyed by class name. The bundled executors
//! and the binary run against it; an embedding application supplies its
//! own world type instead.
//!
//! Identifiers are opaque strings (or circuit numbers) -- how they are
//! minted is the embedder's business, the gateway only looks them up.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PowerCircuit {
    pub fuse_tripped: bool,
}

#[derive(Debug, Clone)]
pub struct Machine {
    /// Class name, doubling as the generator-group key
    /// (e.g. `Build_GeneratorCoal_C`).
    pub class_name: String,
    pub enabled: bool,
    pub recipe: Option<String>,
    pub clock_percent: f64,
    pub is_generator: bool,
}

#[derive(Default)]
struct WorldState {
    circuits: HashMap<i64, PowerCircuit>,
    machines: HashMap<String, Machine>,
    recipes: Vec<String>,
}

/// The simulated plant. All state sits behind one lock; mutations are
/// cheap lookups and field writes.
#[derive(Default)]
pub struct SimWorld {
    state: Mutex<WorldState>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Construction --

    pub fn add_circuit(&self, circuit_id: i64, fuse_tripped: bool) {
        self.state
            .lock()
            .circuits
            .insert(circuit_id, PowerCircuit { fuse_tripped });
    }

    pub fn add_machine(&self, building_id: impl Into<String>, machine: Machine) {
        self.state.lock().machines.insert(building_id.into(), machine);
    }

    pub fn add_recipe(&self, name: impl Into<String>) {
        self.state.lock().recipes.push(name.into());
    }

    // -- Actuation --

    /// Reset a circuit's fuse. Returns whether the fuse was tripped before
    /// the reset, or `None` when the circuit does not exist.
    pub fn reset_fuse(&self, circuit_id: i64) -> Option<bool> {
        let mut state = self.state.lock();
        let circuit = state.circuits.get_mut(&circuit_id)?;
        let was_tripped = circuit.fuse_tripped;
        circuit.fuse_tripped = false;
        Some(was_tripped)
    }

    /// Enable or pause a machine's production. Returns false when the
    /// building does not exist.
    pub fn set_machine_enabled(&self, building_id: &str, enabled: bool) -> bool {
        let mut state = self.state.lock();
        match state.machines.get_mut(building_id) {
            Some(machine) => {
                machine.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// A machine that can take a recipe: exists and is not a generator.
    pub fn manufacturer_exists(&self, machine_id: &str) -> bool {
        self.state
            .lock()
            .machines
            .get(machine_id)
            .is_some_and(|machine| !machine.is_generator)
    }

    /// Resolve a recipe identifier to its canonical name: exact match
    /// first, then substring.
    pub fn resolve_recipe(&self, recipe_id: &str) -> Option<String> {
        let state = self.state.lock();
        if let Some(exact) = state.recipes.iter().find(|name| *name == recipe_id) {
            return Some(exact.clone());
        }
        state
            .recipes
            .iter()
            .find(|name| name.contains(recipe_id))
            .cloned()
    }

    /// Set a machine's recipe. Returns false when the machine does not
    /// exist or is a generator.
    pub fn set_recipe(&self, machine_id: &str, recipe: String) -> bool {
        let mut state = self.state.lock();
        match state.machines.get_mut(machine_id) {
            Some(machine) if !machine.is_generator => {
                machine.recipe = Some(recipe);
                true
            }
            _ => false,
        }
    }

    /// Set a machine's clock. The caller validates the range.
    pub fn set_clock_percent(&self, machine_id: &str, clock_percent: f64) -> bool {
        let mut state = self.state.lock();
        match state.machines.get_mut(machine_id) {
            Some(machine) => {
                machine.clock_percent = clock_percent;
                true
            }
            None => false,
        }
    }

    /// Enable or pause every generator whose class name matches the group
    /// id. Returns how many were toggled.
    pub fn toggle_generator_group(&self, group_id: &str, enabled: bool) -> usize {
        let mut state = self.state.lock();
        let mut count = 0;
        for machine in state.machines.values_mut() {
            if machine.is_generator && machine.class_name == group_id {
                machine.enabled = enabled;
                count += 1;
            }
        }
        count
    }

    // -- Introspection --

    pub fn circuit(&self, circuit_id: i64) -> Option<PowerCircuit> {
        self.state.lock().circuits.get(&circuit_id).cloned()
    }

    pub fn machine(&self, building_id: &str) -> Option<Machine> {
        self.state.lock().machines.get(building_id).cloned()
    }
}
