use crate::settings;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) settings: settings::Settings,
    /// Key given on the command line; requests may still bring their own.
    pub(crate) key: Option<String>,
}
