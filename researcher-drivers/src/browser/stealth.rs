use researcher_common::StealthLevel;
use serde_json::json;
use webdriver::capabilities::Capabilities;

use super::fingerprint::FingerprintProfile;

/// Construct Chrome command-line arguments for a stealth level and the
/// fingerprint used at session start.
pub fn build_stealth_arguments(
    level: StealthLevel,
    profile: &FingerprintProfile,
    headless: bool,
) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-notifications".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-extensions".to_string(),
        "--disable-plugins-discovery".to_string(),
        format!("--user-agent={}", profile.user_agent),
        format!("--window-size={},{}", profile.viewport.0, profile.viewport.1),
        format!("--lang={}", profile.languages.join(",")),
    ];
    if headless {
        args.push("--headless=new".to_string());
        args.push("--no-sandbox".to_string());
        args.push("--disable-gpu".to_string());
    } else if level == StealthLevel::Maximum {
        args.push("--disable-gpu".to_string());
    }
    args
}

/// WebDriver capabilities for a Chrome session with the given arguments.
pub fn chrome_capabilities(args: &[String]) -> Capabilities {
    let mut caps = Capabilities::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": args,
            "excludeSwitches": ["enable-automation"],
            "useAutomationExtension": false,
        }),
    );
    // Return control once DOMContentLoaded fires.
    caps.insert("pageLoadStrategy".to_string(), json!("eager"));
    caps
}

/// JavaScript evasions applied after each page load to reduce automation signals.
pub struct StealthScripts;

impl StealthScripts {
    pub fn core_evasions(profile: &FingerprintProfile) -> String {
        let languages = json!(profile.languages);
        format!(
            r#"
            Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
            Object.defineProperty(navigator, 'plugins', {{ get: () => [1,2,3,4,5] }});
            Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
            if (!window.chrome) window.chrome = {{ runtime: {{}} }};
            "#
        )
    }

    pub fn webgl_evasions() -> &'static str {
        r#"
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = function(parameter) {
                if (parameter === 37445) return 'Intel Inc.';
                if (parameter === 37446) return 'Intel Iris OpenGL Engine';
                return getParameter.call(this, parameter);
            };
        "#
    }

    pub fn canvas_evasions() -> &'static str {
        r#"
            const getContext = HTMLCanvasElement.prototype.getContext;
            HTMLCanvasElement.prototype.getContext = function(type,...args){
                const ctx = getContext.call(this,type,...args);
                if(type==='2d' && ctx) {
                    const origToDataURL=this.toDataURL;
                    this.toDataURL=function(...a){
                        const imgdata=ctx.getImageData(0,0,this.width,this.height);
                        for(let i=0;i<imgdata.data.length;i+=4){
                            if(Math.random()<0.001)imgdata.data[i]+=Math.random()<0.5?-1:1;
                        }
                        ctx.putImageData(imgdata,0,0);
                        return origToDataURL.call(this,...a);
                    };
                }
                return ctx;
            };
        "#
    }

    /// Align `navigator` identity with the rotated profile.
    pub fn identity_overrides(profile: &FingerprintProfile) -> String {
        let platform = json!(profile.platform);
        let user_agent = json!(profile.user_agent);
        format!(
            r#"
            Object.defineProperty(navigator, 'platform', {{ get: () => {platform} }});
            Object.defineProperty(navigator, 'userAgent', {{ get: () => {user_agent} }});
            "#
        )
    }

    /// Every script for `level`, in application order.
    pub fn for_level(level: StealthLevel, profile: &FingerprintProfile) -> Vec<String> {
        let mut scripts = vec![Self::core_evasions(profile)];
        match level {
            StealthLevel::Lightweight => {}
            StealthLevel::Balanced => {
                scripts.push(Self::canvas_evasions().to_string());
            }
            StealthLevel::Maximum => {
                scripts.push(Self::canvas_evasions().to_string());
                scripts.push(Self::webgl_evasions().to_string());
                scripts.push(Self::identity_overrides(profile));
            }
        }
        scripts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_carry_the_fingerprint() {
        let profile = FingerprintProfile::default();
        let args = build_stealth_arguments(StealthLevel::Balanced, &profile, false);
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--window-size=1920,1080".to_string()));
        assert!(args.contains(&"--lang=en-US,en".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn headless_adds_its_flags() {
        let args = build_stealth_arguments(StealthLevel::Lightweight, &FingerprintProfile::default(), true);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--disable-gpu".to_string()));
    }

    #[test]
    fn capabilities_hide_the_automation_switch() {
        let caps = chrome_capabilities(&["--foo".to_string()]);
        let opts = &caps["goog:chromeOptions"];
        assert_eq!(opts["excludeSwitches"], json!(["enable-automation"]));
        assert_eq!(opts["useAutomationExtension"], json!(false));
        assert_eq!(opts["args"], json!(["--foo"]));
    }

    #[test]
    fn script_count_grows_with_level() {
        let profile = FingerprintProfile::default();
        assert_eq!(StealthScripts::for_level(StealthLevel::Lightweight, &profile).len(), 1);
        assert_eq!(StealthScripts::for_level(StealthLevel::Balanced, &profile).len(), 2);
        let max = StealthScripts::for_level(StealthLevel::Maximum, &profile);
        assert_eq!(max.len(), 4);
        assert!(max[3].contains("\"Win32\""));
    }
}
