//! Supported distributions and their installation data.
//!
//! The set of distributions is closed: [`DistroId`] enumerates every one of
//! them, and [`DistroId::descriptor`] maps each to exactly one static
//! [`DistroDescriptor`]. Adding a distribution means adding a variant, and
//! the compiler then points at every match that needs a new arm.

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A supported Linux distribution, named as `lsb_release` prints it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
pub enum DistroId {
    #[strum(serialize = "Debian")]
    Debian,
    #[strum(serialize = "Linuxmint")]
    LinuxMint,
    #[strum(serialize = "CentOS")]
    CentOS,
}

/// Which family of installation steps a distribution uses.
///
/// Distributions in the same family share package manager, service control
/// and configuration file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PipelineFlavor {
    /// apt, `sites-enabled`, SysV init script, `/etc/supervisor/conf.d`.
    Debian,
    /// dnf, `conf.d`, systemd, `/etc/supervisord.d`.
    RedHat,
}

impl PipelineFlavor {
    /// Non-interactive package install command prefix.
    pub fn install_command(&self) -> &'static str {
        match self {
            Self::Debian => "apt-get -y install",
            Self::RedHat => "dnf -y install",
        }
    }

    /// NodeSource setup script for this package format.
    pub fn node_setup_url(&self) -> &'static str {
        match self {
            Self::Debian => "https://deb.nodesource.com/setup_16.x",
            Self::RedHat => "https://rpm.nodesource.com/setup_16.x",
        }
    }

    /// The site shipped by the web server package, removed before ours is installed.
    pub fn default_site_path(&self) -> &'static str {
        match self {
            Self::Debian => "/etc/nginx/sites-enabled/default",
            Self::RedHat => "/etc/nginx/conf.d/default.conf",
        }
    }

    /// Where the application's site file is installed.
    pub fn site_path(&self, app_name: &str) -> String {
        match self {
            Self::Debian => format!("/etc/nginx/sites-enabled/{}", app_name),
            Self::RedHat => format!("/etc/nginx/conf.d/{}.conf", app_name),
        }
    }

    /// Command that restarts the web server.
    pub fn web_restart_command(&self) -> &'static str {
        match self {
            Self::Debian => "/etc/init.d/nginx restart",
            Self::RedHat => "systemctl restart nginx",
        }
    }

    /// Where the supervisor program file is installed.
    pub fn supervisor_conf_path(&self, app_name: &str) -> String {
        match self {
            Self::Debian => format!("/etc/supervisor/conf.d/{}.conf", app_name),
            Self::RedHat => format!("/etc/supervisord.d/{}.ini", app_name),
        }
    }

    /// Local socket the PHP FastCGI process manager listens on.
    pub fn php_fpm_socket(&self) -> &'static str {
        match self {
            Self::Debian => "/var/run/php/php8.2-fpm.sock",
            Self::RedHat => "/run/php-fpm/www.sock",
        }
    }

    /// PHP binary used by the queue worker.
    pub fn php_binary(&self) -> &'static str {
        match self {
            Self::Debian => "php8.2",
            Self::RedHat => "php",
        }
    }
}

/// Static installation data for one distribution.
#[derive(Debug, PartialEq, Eq)]
pub struct DistroDescriptor {
    pub id: DistroId,
    pub supported_releases: &'static [&'static str],
    /// Installed in this order.
    pub packages: &'static [&'static str],
    pub flavor: PipelineFlavor,
}

impl DistroDescriptor {
    /// Whether `release` is on this distribution's allow-list.
    pub fn is_supported(&self, release: &str) -> bool {
        self.supported_releases.contains(&release)
    }
}

const DEBIAN_PACKAGES: &[&str] = &[
    "curl",
    "git",
    "unzip",
    "nginx",
    "mariadb-server",
    "redis-server",
    "php8.2-fpm",
    "php8.2-cli",
    "php8.2-mysql",
    "php8.2-mbstring",
    "php8.2-xml",
    "php8.2-curl",
    "php8.2-zip",
    "php8.2-gd",
    "php8.2-bcmath",
    "php8.2-intl",
    "php8.2-redis",
];

const CENTOS_PACKAGES: &[&str] = &[
    "curl",
    "git",
    "unzip",
    "nginx",
    "mariadb-server",
    "redis",
    "php-fpm",
    "php-cli",
    "php-mysqlnd",
    "php-mbstring",
    "php-xml",
    "php-zip",
    "php-gd",
    "php-bcmath",
    "php-intl",
    "php-pecl-redis",
];

static DEBIAN: DistroDescriptor = DistroDescriptor {
    id: DistroId::Debian,
    supported_releases: &["11"],
    packages: DEBIAN_PACKAGES,
    flavor: PipelineFlavor::Debian,
};

static LINUX_MINT: DistroDescriptor = DistroDescriptor {
    id: DistroId::LinuxMint,
    supported_releases: &["21"],
    packages: DEBIAN_PACKAGES,
    flavor: PipelineFlavor::Debian,
};

static CENTOS: DistroDescriptor = DistroDescriptor {
    id: DistroId::CentOS,
    supported_releases: &["8", "9"],
    packages: CENTOS_PACKAGES,
    flavor: PipelineFlavor::RedHat,
};

impl DistroId {
    /// The descriptor for this distribution.
    pub fn descriptor(&self) -> &'static DistroDescriptor {
        match self {
            Self::Debian => &DEBIAN,
            Self::LinuxMint => &LINUX_MINT,
            Self::CentOS => &CENTOS,
        }
    }
}

/// Looks up a distribution by its `lsb_release` identifier.
///
/// Matching is exact; unknown identifiers return `None`.
pub fn resolve(identifier: &str) -> Option<&'static DistroDescriptor> {
    identifier
        .parse::<DistroId>()
        .ok()
        .map(|id| id.descriptor())
}
