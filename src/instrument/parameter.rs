//! Cached instrument parameters
//!
//! A [`ParameterRegistry`] is the declarative parameter table of one module.
//! Each parameter is registered once, at module construction, with its
//! validator, unit, initial cache and the function that turns a new value
//! into a [`Command`].
//!
//! # State machine
//!
//! ```text
//! Uninitialized --set(value)--> Cached(value)
//! Cached(old)   --set(value)--> Cached(value)
//! ```
//!
//! `set()` validates, writes the command and only then updates the cache.
//! No verification read is made. `get()` of a group member issues the
//! group's learn query and refreshes every member at once; `get()` of any
//! other parameter answers from the cache without I/O.
//!
//! # Groups
//!
//! Several parameters programmed by one instruction (`WDCV`, `WTDCV`, `ACT`)
//! form a [`Group`]. Setting one member re-sends the instruction with the
//! cached values of the others.

use log::debug;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::b1500::response::ParsedFields;
use super::command::Command;
use super::link::{self, SharedLink};
use super::value::ParamValue;
use crate::error::{AppResult, DaqError};

/// Builds the command for a new value; may read other cached parameters.
pub type SetCommandFn =
    Arc<dyn Fn(&ParameterRegistry, &ParamValue) -> AppResult<Command> + Send + Sync>;

/// Builds the group instruction from member values in member order.
pub type GroupCommandFn = Arc<dyn Fn(&[ParamValue]) -> AppResult<Command> + Send + Sync>;

/// Parses the reply to a group's learn query.
pub type GroupParser = fn(&str) -> AppResult<ParsedFields>;

/// Runs after a value was written and cached.
pub type AfterSetFn = fn(&mut ParameterRegistry, &ParamValue);

/// Legal domain of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Validator {
    /// Every value accepted.
    #[default]
    Unbounded,

    /// Inclusive numeric range; integers are accepted too.
    Numbers {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// Inclusive integer range.
    Ints {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
    },

    /// Membership in a set of enumeration codes.
    Enum(&'static [i64]),
}

impl Validator {
    /// Check `value` for parameter `name`.
    pub fn validate(&self, name: &str, value: &ParamValue) -> AppResult<()> {
        match *self {
            Validator::Unbounded => Ok(()),

            Validator::Numbers { min, max } => {
                let v = value.as_f64();
                if (min..=max).contains(&v) {
                    Ok(())
                } else {
                    Err(DaqError::invalid_argument(
                        name,
                        format!("{value} is not in [{min}, {max}]"),
                    ))
                }
            }

            Validator::Ints { min, max } => match value.as_i64() {
                Some(v) if (min..=max).contains(&v) => Ok(()),
                Some(v) => Err(DaqError::invalid_argument(
                    name,
                    format!("{v} is not in [{min}, {max}]"),
                )),
                None => Err(DaqError::invalid_argument(
                    name,
                    format!("{value} is not an integer"),
                )),
            },

            Validator::Enum(codes) => match value.as_i64() {
                Some(v) if codes.contains(&v) => Ok(()),
                _ => Err(DaqError::invalid_argument(
                    name,
                    format!("{value} is not one of {codes:?}"),
                )),
            },
        }
    }
}

/// Static description of one parameter.
#[derive(Clone)]
pub struct ParameterDescriptor {
    name: &'static str,
    unit: &'static str,
    validator: Validator,
    initial: Option<ParamValue>,
    group: Option<&'static str>,
    set_cmd: Option<SetCommandFn>,
    after_set: Option<AfterSetFn>,
}

impl ParameterDescriptor {
    /// Unbounded, unit-less parameter that cannot be set.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            unit: "",
            validator: Validator::Unbounded,
            initial: None,
            group: None,
            set_cmd: None,
            after_set: None,
        }
    }

    /// Unit shown with the value, e.g. `V`.
    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Domain checked before anything is sent.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Value cached at registration. Nothing is sent to the instrument.
    pub fn initial(mut self, value: impl Into<ParamValue>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Command writer for parameters that are not group members.
    pub fn set_cmd(
        mut self,
        build: impl Fn(&ParameterRegistry, &ParamValue) -> AppResult<Command> + Send + Sync + 'static,
    ) -> Self {
        self.set_cmd = Some(Arc::new(build));
        self
    }

    /// Hook run on the registry after a successful set.
    pub fn after_set(mut self, hook: AfterSetFn) -> Self {
        self.after_set = Some(hook);
        self
    }

    /// Parameter name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDescriptor")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("validator", &self.validator)
            .field("initial", &self.initial)
            .field("group", &self.group)
            .finish()
    }
}

/// Cache state of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterState {
    /// Never set or read back
    Uninitialized,
    /// Last value written or read
    Cached(ParamValue),
}

/// A registered parameter and its cache.
#[derive(Debug)]
pub struct Parameter {
    descriptor: ParameterDescriptor,
    state: ParameterState,
}

impl Parameter {
    /// Parameter name.
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Unit of the value.
    pub fn unit(&self) -> &'static str {
        self.descriptor.unit
    }

    /// Value domain.
    pub fn validator(&self) -> Validator {
        self.descriptor.validator
    }

    /// Group the parameter belongs to, if any.
    pub fn group(&self) -> Option<&'static str> {
        self.descriptor.group
    }

    /// Cache state.
    pub fn state(&self) -> ParameterState {
        self.state
    }

    /// Cached value, `None` while uninitialized.
    pub fn cached(&self) -> Option<ParamValue> {
        match self.state {
            ParameterState::Cached(value) => Some(value),
            ParameterState::Uninitialized => None,
        }
    }
}

/// Parameters programmed and read back as one unit.
pub struct Group {
    name: &'static str,
    members: Vec<&'static str>,
    set_cmd: GroupCommandFn,
    get_cmd: Command,
    parser: GroupParser,
}

impl Group {
    /// Group over `members`, in the argument order of `set_cmd`.
    ///
    /// `get_cmd` reads the group back and `parser` extracts every member
    /// from its reply.
    pub fn new(
        name: &'static str,
        members: &[&'static str],
        set_cmd: impl Fn(&[ParamValue]) -> AppResult<Command> + Send + Sync + 'static,
        get_cmd: Command,
        parser: GroupParser,
    ) -> Self {
        Self {
            name,
            members: members.to_vec(),
            set_cmd: Arc::new(set_cmd),
            get_cmd,
            parser,
        }
    }

    /// Group name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Member names in command order.
    pub fn members(&self) -> &[&'static str] {
        &self.members
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("get_cmd", &self.get_cmd)
            .finish()
    }
}

/// Parameter table of one instrument module.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    parameters: Vec<Parameter>,
    groups: Vec<Group>,
}

impl ParameterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter. Names are unique.
    pub fn register(&mut self, descriptor: ParameterDescriptor) -> AppResult<()> {
        if self.index_of(descriptor.name).is_ok() {
            return Err(DaqError::invalid_argument(
                descriptor.name,
                "parameter registered twice",
            ));
        }
        let state = match descriptor.initial {
            Some(value) => {
                descriptor.validator.validate(descriptor.name, &value)?;
                ParameterState::Cached(value)
            }
            None => ParameterState::Uninitialized,
        };
        self.parameters.push(Parameter { descriptor, state });
        Ok(())
    }

    /// Add a group over already registered parameters.
    pub fn add_group(&mut self, group: Group) -> AppResult<()> {
        for member in &group.members {
            let index = self.index_of(member)?;
            let descriptor = &mut self.parameters[index].descriptor;
            if let Some(other) = descriptor.group {
                return Err(DaqError::invalid_argument(
                    *member,
                    format!("already member of group '{other}'"),
                ));
            }
            descriptor.group = Some(group.name);
        }
        self.groups.push(group);
        Ok(())
    }

    fn index_of(&self, name: &str) -> AppResult<usize> {
        self.parameters
            .iter()
            .position(|p| p.descriptor.name == name)
            .ok_or_else(|| DaqError::invalid_argument(name, "unknown parameter"))
    }

    fn group(&self, name: &str) -> AppResult<&Group> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| DaqError::invalid_argument(name, "unknown parameter group"))
    }

    /// Registered parameter `name`.
    pub fn parameter(&self, name: &str) -> AppResult<&Parameter> {
        self.index_of(name).map(|i| &self.parameters[i])
    }

    /// All parameters in registration order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Cached value of `name` without I/O.
    pub fn cached(&self, name: &str) -> AppResult<Option<ParamValue>> {
        self.parameter(name).map(Parameter::cached)
    }

    /// Cached value of `name`, `NotReady` while uninitialized.
    pub fn require_cached(&self, name: &str) -> AppResult<ParamValue> {
        self.cached(name)?
            .ok_or_else(|| DaqError::NotReady(format!("parameter '{name}' has no value yet")))
    }

    /// Drop the cache of `name`.
    pub fn invalidate(&mut self, name: &str) -> AppResult<()> {
        let index = self.index_of(name)?;
        self.parameters[index].state = ParameterState::Uninitialized;
        Ok(())
    }

    /// Command that would program `name` to `value`, with all checks applied.
    pub fn command_for(&self, name: &str, value: &ParamValue) -> AppResult<Command> {
        let parameter = self.parameter(name)?;
        parameter.descriptor.validator.validate(name, value)?;

        if let Some(group_name) = parameter.descriptor.group {
            let group = self.group(group_name)?;
            let values = group
                .members
                .iter()
                .map(|member| {
                    if *member == name {
                        Ok(*value)
                    } else {
                        self.require_cached(member)
                    }
                })
                .collect::<AppResult<Vec<_>>>()?;
            return (group.set_cmd)(&values);
        }

        match &parameter.descriptor.set_cmd {
            Some(build) => build(self, value),
            None => Err(DaqError::invalid_argument(name, "parameter cannot be set")),
        }
    }

    /// Validate and cache `value` without I/O.
    ///
    /// For drivers that programmed `name` with a command of their own.
    pub fn record(&mut self, name: &str, value: impl Into<ParamValue>) -> AppResult<()> {
        let value = value.into();
        let index = self.index_of(name)?;
        self.parameters[index].descriptor.validator.validate(name, &value)?;
        self.parameters[index].state = ParameterState::Cached(value);
        debug!("parameter '{}' recorded as {}", name, value);
        Ok(())
    }

    /// Validate, write and cache.
    pub async fn set(
        &mut self,
        link: &SharedLink,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> AppResult<()> {
        let value = value.into();
        let command = self.command_for(name, &value)?;
        link::write(link, &command).await?;

        let index = self.index_of(name)?;
        self.parameters[index].state = ParameterState::Cached(value);
        debug!("parameter '{}' set to {}", name, value);

        let after_set = self.parameters[index].descriptor.after_set;
        if let Some(hook) = after_set {
            hook(self, &value);
        }
        Ok(())
    }

    /// Current value of `name`.
    ///
    /// Group members are read back from the instrument; every other
    /// parameter answers from its cache.
    pub async fn get(
        &mut self,
        link: &SharedLink,
        timeout: Duration,
        name: &str,
    ) -> AppResult<ParamValue> {
        let group = self.parameter(name)?.group();
        if let Some(group) = group {
            self.refresh_group(link, timeout, group).await?;
        }
        self.require_cached(name)
    }

    /// Read a group back; members are updated together or not at all.
    pub async fn refresh_group(
        &mut self,
        link: &SharedLink,
        timeout: Duration,
        group_name: &str,
    ) -> AppResult<()> {
        let group = self.group(group_name)?;
        let get_cmd = group.get_cmd.clone();
        let parser = group.parser;
        let members = group.members.clone();

        let reply = link::ask(link, &get_cmd, timeout).await?;
        let fields = parser(&reply)?;

        let mut updates = Vec::with_capacity(members.len());
        for member in &members {
            updates.push((self.index_of(member)?, fields.require(group_name, member)?));
        }
        for (index, value) in updates {
            self.parameters[index].state = ParameterState::Cached(value);
        }
        debug!("group '{}' refreshed from '{}'", group_name, get_cmd);
        Ok(())
    }
}
