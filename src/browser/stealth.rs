//! Fingerprint evasion applied to every page and launch flags for Chrome.

/// Chrome flags used for every locally launched instance.
pub const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-notifications",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--no-first-run",
    "--no-default-browser-check",
    "--mute-audio",
    "--window-size=1920,1080",
];

/// Evasion snippets, joined into a single document-start script.
pub const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Plausible hardware
    r#"
    Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8, configurable: true });
    Object.defineProperty(navigator, 'deviceMemory', { get: () => 8, configurable: true });
    "#,
    // Platform must agree with the Windows user agent
    r#"
    Object.defineProperty(navigator, 'platform', { get: () => 'Win32', configurable: true });
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    // Permissions API answers like a fresh profile
    r#"
    if (window.navigator.permissions) {
        window.navigator.permissions.query = () => Promise.resolve({ state: 'prompt' });
    }
    "#,
    // Headless Chrome has no chrome namespace
    r#"
    if (typeof window.chrome === 'undefined') {
        window.chrome = { app: {}, runtime: {} };
    }
    "#,
];

/// All evasion snippets as one script, each isolated so a failure in one does
/// not stop the rest.
pub fn evasion_script() -> String {
    STEALTH_SCRIPTS
        .iter()
        .map(|snippet| format!("try {{ {} }} catch (e) {{}}", snippet.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
