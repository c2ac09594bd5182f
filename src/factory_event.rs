/// Events emitted by a factory during operations.
///
/// These events are passed to the tracing callback set via `set_trace_callback`.
/// The `Clone` derive allows callbacks to store or forward events if needed.
///
/// # Examples
///
/// ```rust
/// use singleton_factory::FactoryEvent;
///
/// let event = FactoryEvent::Construct { type_name: "app::Config", success: true };
/// assert_eq!(event.to_string(), "construct { type_name: app::Config, success: true }");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FactoryEvent {
    /// A constructor ran.
    Construct {
        type_name: &'static str,
        /// `false` when the constructor returned an error.
        success: bool,
    },

    /// An instance was handed out by `get_instance`.
    Get {
        type_name: &'static str,
        /// `false` when an existing instance was returned and the arguments were dropped.
        constructed: bool,
    },

    /// A slot was reset.
    Reset {
        type_name: &'static str,
        /// Whether there was an instance to drop.
        found: bool,
    },

    /// An initialization check or argument-free lookup was performed.
    Contains {
        type_name: &'static str,
        found: bool,
    },

    /// Every slot of the factory was cleared.
    Clear {},
}

impl std::fmt::Display for FactoryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactoryEvent::Construct { type_name, success } => {
                write!(f, "construct {{ type_name: {type_name}, success: {success} }}")
            }
            FactoryEvent::Get {
                type_name,
                constructed,
            } => {
                write!(
                    f,
                    "get {{ type_name: {type_name}, constructed: {constructed} }}"
                )
            }
            FactoryEvent::Reset { type_name, found } => {
                write!(f, "reset {{ type_name: {type_name}, found: {found} }}")
            }
            FactoryEvent::Contains { type_name, found } => {
                write!(f, "contains {{ type_name: {type_name}, found: {found} }}")
            }
            FactoryEvent::Clear {} => write!(f, "clear {{}}"),
        }
    }
}
