/// Builds a [`PageRegistry`](crate::pages::registry::PageRegistry) from page
/// modules grouped into modes. Each module must expose `PAGE_CONFIG` and an
/// `init()` returning its page.
///
/// ```ignore
/// let registry = register_pages! {
///     { mode: "Synth", enabled: true, pages: [oscillator, filter] },
///     { mode: "Scope", enabled: true, pages: [scope] },
/// }?;
/// ```
#[macro_export]
macro_rules! register_pages {
    (
        $(
            {
                mode: $mode:expr,
                enabled: $enabled:expr,
                pages: [$($module:ident),* $(,)?]
            }
        ),+ $(,)?
    ) => {{
        (|| -> $crate::core::error::Result<
            $crate::pages::registry::PageRegistry,
        > {
            let mut __registry = $crate::pages::registry::PageRegistry::new();

            $(
                let mut __mode_pages = Vec::new();
                $(
                    if !__registry.has($module::PAGE_CONFIG.name) {
                        __registry.register(
                            &$module::PAGE_CONFIG,
                            || Box::new($module::init()),
                        )?;
                    }
                    __mode_pages.push($module::PAGE_CONFIG.name.to_string());
                )*

                __registry.define_mode($mode, $enabled, __mode_pages)?;
            )+

            Ok(__registry)
        })()
    }};
}
