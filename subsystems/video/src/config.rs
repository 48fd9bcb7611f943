//! # Video Configuration
//!
//! Settings the application chooses before (or between) mode-sets: which
//! presentation driver to use, whether to wait for vertical blank, how to
//! settle the 50/60 Hz question on non-US consoles, and the logical window
//! size for the textured driver.

/// Presentation driver selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoDriver {
    /// Draw straight into video memory; double-buffered frames are copied
    /// by the CPU
    Direct,
    /// Double-buffered frames are moved by the DMA engine
    #[default]
    Dma,
    /// Windowed modes are drawn as a GPU texture scaled to the display
    Textured,
}

/// Interactive 50/60 Hz chooser supplied by the application
pub trait RefreshPrompt {
    /// Ask whether to run at 60 Hz, preselecting `default_60hz`
    fn ask_60hz(&mut self, default_60hz: bool) -> bool;
}

/// Prompt that always accepts the preselected answer
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDefault;

impl RefreshPrompt for AcceptDefault {
    fn ask_60hz(&mut self, default_60hz: bool) -> bool {
        default_60hz
    }
}

/// How to pick the refresh rate when the console region allows both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Show the interactive prompt
    pub show_prompt: bool,
    /// Answer used when the prompt is suppressed, and preselected otherwise
    pub default_60hz: bool,
}

impl RefreshPolicy {
    /// Settle the refresh rate, consulting `prompt` if allowed
    pub fn choose_60hz(&self, prompt: &mut dyn RefreshPrompt) -> bool {
        if self.show_prompt {
            prompt.ask_60hz(self.default_60hz)
        } else {
            self.default_60hz
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            show_prompt: true,
            default_60hz: false,
        }
    }
}

/// Video subsystem configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoConfig {
    /// Presentation driver
    pub driver: VideoDriver,
    /// Wait for vertical blank before presenting
    pub vertical_wait: bool,
    /// Refresh-rate policy
    pub refresh: RefreshPolicy,
    /// Logical window size for the next textured mode-set
    pub window: Option<(u32, u32)>,
}

impl VideoConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the presentation driver
    pub fn driver(mut self, driver: VideoDriver) -> Self {
        self.driver = driver;
        self
    }

    /// Enable or disable the vertical-blank wait
    pub fn vertical_wait(mut self, wait: bool) -> Self {
        self.vertical_wait = wait;
        self
    }

    /// Show or suppress the refresh-rate prompt
    pub fn show_refresh_prompt(mut self, show: bool) -> Self {
        self.refresh.show_prompt = show;
        self
    }

    /// Set the default refresh-rate answer
    pub fn default_60hz(mut self, default_60hz: bool) -> Self {
        self.refresh.default_60hz = default_60hz;
        self
    }

    /// Set the logical window size for the textured driver
    pub fn window(mut self, width: u32, height: u32) -> Self {
        self.window = Some((width, height));
        self
    }
}
