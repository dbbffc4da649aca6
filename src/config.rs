/// This structure contains the configuration settings for a heap.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// After a collection the generation is grown when the live words
    /// exceed this fraction of its capacity. Growth adds one pool for every
    /// pool already in the generation.
    pub survivor_ratio_trigger: f32,

    /// Run the generation grower after every collection. When off, growth
    /// only happens through [`crate::Heap::expand_generation`].
    pub auto_expand: bool,

    /// Linking a new pool into the generation requests a collection at the
    /// next yield point. Turning this off leaves explicit
    /// [`crate::Heap::collect`] calls as the only way to collect.
    pub collect_on_grow: bool,
}

pub const CONFIG_DEFAULT_SURVIVOR_RATIO_TRIGGER: f32 = 0.5;
pub const CONFIG_DEFAULT_AUTO_EXPAND: bool = true;
pub const CONFIG_DEFAULT_COLLECT_ON_GROW: bool = true;

impl Default for Config {
    /// Creates a default Config. Good for most use cases.
    fn default() -> Self {
        Config {
            survivor_ratio_trigger: CONFIG_DEFAULT_SURVIVOR_RATIO_TRIGGER,
            auto_expand: CONFIG_DEFAULT_AUTO_EXPAND,
            collect_on_grow: CONFIG_DEFAULT_COLLECT_ON_GROW,
        }
    }
}
