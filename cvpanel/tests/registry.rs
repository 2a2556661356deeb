mod common;

use cvpanel::prelude::*;

mod oscillator {
    use super::common::GridPage;
    use cvpanel::prelude::*;

    pub static PAGE_CONFIG: PageConfig = PageConfig {
        name: "Oscillator",
        display_name: "Osc",
        owner: "synth",
        tier: RateTier::Normal,
        partial_redraw: true,
        continuous: false,
    };

    pub fn init() -> GridPage {
        GridPage::new("Osc")
    }
}

mod filter {
    use super::common::GridPage;
    use cvpanel::prelude::*;

    pub static PAGE_CONFIG: PageConfig = PageConfig {
        name: "Filter",
        display_name: "Filter",
        owner: "synth",
        tier: RateTier::Normal,
        partial_redraw: true,
        continuous: false,
    };

    pub fn init() -> GridPage {
        GridPage::new("Filter")
    }
}

mod scope {
    use super::common::GridPage;
    use cvpanel::prelude::*;

    pub static PAGE_CONFIG: PageConfig = PageConfig {
        name: "Scope",
        display_name: "Scope",
        owner: "scope",
        tier: RateTier::High,
        partial_redraw: false,
        continuous: false,
    };

    pub fn init() -> GridPage {
        GridPage::new("Scope")
    }
}

#[test]
fn macro_registers_each_page_once_and_groups_modes() {
    let registry = register_pages! {
        { mode: "Synth", enabled: true, pages: [oscillator, filter] },
        { mode: "Scope", enabled: false, pages: [scope] },
        { mode: "All", enabled: true, pages: [scope, oscillator] },
    }
    .expect("registry");

    assert_eq!(registry.page_names(), vec!["Oscillator", "Filter", "Scope"]);
    assert_eq!(registry.modes().len(), 3);

    let synth = registry.mode("Synth").expect("Synth");
    assert_eq!(synth.pages, vec!["Oscillator", "Filter"]);
    assert!(!registry.mode("Scope").expect("Scope").enabled);

    // Disabled modes do not claim pages.
    let owner = registry.mode_of("Scope").map(|m| m.name.as_str());
    assert_eq!(owner, Some("All"));
    assert_eq!(registry.cycle(Some("All")), vec!["Scope", "Oscillator"]);
    assert_eq!(registry.cycle(None).len(), 3);
}

#[test]
fn duplicate_mode_names_fail_the_whole_registration() {
    let result = register_pages! {
        { mode: "Synth", enabled: true, pages: [oscillator] },
        { mode: "Synth", enabled: true, pages: [filter] },
    };
    assert!(matches!(result, Err(PanelError::Configuration(_))));
}

#[test]
fn controller_starts_in_the_first_enabled_mode() {
    let registry = register_pages! {
        { mode: "Scope", enabled: false, pages: [scope] },
        { mode: "Synth", enabled: true, pages: [filter, oscillator] },
    }
    .expect("registry");

    let dir = tempfile::tempdir().expect("tempdir");
    let mut runtime = PanelRuntime::new(
        registry,
        common::settings(dir.path()),
        Theme::dark(),
    )
    .expect("runtime");
    runtime.start(None).expect("start");

    let controller = runtime.controller();
    assert_eq!(controller.active_name(), Some("Filter"));
    assert_eq!(controller.active_mode(), Some("Synth"));
    assert_eq!(
        controller.owner_pages().get("synth").map(String::as_str),
        Some("Filter")
    );
}
