//! Post-install guidance shown to the user.

use crate::formula::{Formula, VariantLabel};

/// Render the caveats for an installed formula.
///
/// The text explains how to run the per-user daemon, how to register it for
/// automatic start-up, and that it needs a restart after upgrades. Pre-release
/// variants get an extra warning.
pub fn render(formula: &Formula, label: VariantLabel) -> String {
    let product = formula.display_name();
    let bin = formula.binary_name();

    let mut text = format!(
        "\
{product} has a daemon component that runs on a per-user basis. You'll need
to invoke the following manually and/or add it to your shell
initialization script:

  {bin} daemon start

This command is idempotent and can be run any number of times.

Experimental support for automatically starting the daemon on macOS via
launchd is also available. To register {product} as a per-user daemon with
launchd, use:

  {bin} daemon register

This registration can be removed with:

  {bin} daemon unregister

In order to take advantage of automatic start-up, either log out and log
back in or run:

  {bin} daemon start

This support is experimental, so please provide feedback if you run into
any issues.

Please note that the {product} daemon should be manually restarted after an
update using:

  {bin} daemon stop
  {bin} daemon start
"
    );

    if label.is_unstable() {
        let builds = match &formula.prerelease_channel {
            Some(channel) => format!("{channel} releases"),
            None => "pre-release builds".to_string(),
        };
        text.push_str(&format!(
            "\nWARNING: {product} {builds} are unstable and entirely unsupported.\n"
        ));
    }

    text
}
