//! Configuration file templates and their installation.
//!
//! Templates are fixed text with `{{placeholder}}` markers; rendering is
//! plain substitution. Installed files are written to a local staging
//! directory first and then moved into place with an elevated `mv`, since
//! the installer itself cannot write into `/etc`.

use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::{Captures, Regex};
use rustix::fs::Mode;
use strum::Display;
use tracing::{debug, info};

use crate::error::ProvisionError;
use crate::privilege::Credential;
use crate::shell::Shell;

/// Which configuration file to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TemplateKind {
    /// nginx server block for the application.
    ReverseProxySite,
    /// supervisor program running the queue worker.
    SupervisorWorker,
}

const REVERSE_PROXY_SITE: &str = r#"server {

    server_name {{hostname}};
    root {{app_dir}}/public;
    index index.php;
    access_log /var/log/nginx/{{program}}.access.log;
    error_log /var/log/nginx/{{program}}.error.log;
    charset utf-8;
    location / {
        try_files $uri $uri/ /index.php?$query_string;
    }

    location = /favicon.ico { log_not_found off; access_log off; }
    location = /robots.txt { log_not_found off; access_log off; }
    error_page 404 /index.php;
    location ~ \.php$ {
        try_files $uri =404;
        fastcgi_split_path_info ^(.+\.php)(/.+)$;
        fastcgi_pass unix:{{php_socket}};
        fastcgi_index index.php;
        fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
        include fastcgi_params;
    }
    # Deny .htaccess file access
    location ~ /\.ht {
    deny all;
    }
}
"#;

const SUPERVISOR_WORKER: &str = r#"[program:{{program}}]
command={{php}} {{app_dir}}/artisan queue:listen redis --sleep=10 --quiet --force --queue="{{program}}"
process_name=%(program_name)s_%(process_num)02d
autostart=true
autorestart=true
stopasgroup=true
killasgroup=true
user={{user}}
numprocs=1
stdout_logfile={{worker_log}}
"#;

/// Values substituted into templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValues {
    pub hostname: String,
    pub user: String,
    /// Application checkout, e.g. `/home/deploy/logic`.
    pub app_dir: Utf8PathBuf,
    /// Program name used for the supervisor group and log file names.
    pub program: String,
    pub php_socket: String,
    pub php_binary: String,
    pub worker_log: Utf8PathBuf,
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

impl TemplateValues {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "hostname" => Some(&self.hostname),
            "user" => Some(&self.user),
            "app_dir" => Some(self.app_dir.as_str()),
            "program" => Some(&self.program),
            "php_socket" => Some(&self.php_socket),
            "php" => Some(&self.php_binary),
            "worker_log" => Some(self.worker_log.as_str()),
            _ => None,
        }
    }
}

/// Renders `kind` with `values`.
///
/// Placeholders are replaced in a single pass over the template, so a value
/// that itself looks like `{{placeholder}}` is written literally. Equal
/// inputs give byte-identical output.
pub fn render(kind: TemplateKind, values: &TemplateValues) -> String {
    let template = match kind {
        TemplateKind::ReverseProxySite => REVERSE_PROXY_SITE,
        TemplateKind::SupervisorWorker => SUPERVISOR_WORKER,
    };
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            values.lookup(&caps[1]).unwrap_or(&caps[0]).to_string()
        })
        .into_owned()
}

/// Removes a staged file when dropped, so a failed `mv` leaves nothing behind.
struct StagedFileGuard {
    path: Utf8PathBuf,
    dry_run: bool,
}

impl Drop for StagedFileGuard {
    fn drop(&mut self) {
        if !self.dry_run {
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!("cleaned up staged file: {}", self.path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("staged file already moved: {}", self.path);
                }
                Err(e) => {
                    tracing::error!("failed to cleanup staged file {}: {}", self.path, e);
                }
            }
        }
    }
}

/// Local directory where rendered files are staged before being moved into place.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: Utf8PathBuf,
    dry_run: bool,
}

impl Staging {
    pub fn new(dir: impl Into<Utf8PathBuf>, dry_run: bool) -> Self {
        Self {
            dir: dir.into(),
            dry_run,
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Writes `body` to a staging file and moves it to `destination` as root.
    ///
    /// The staged file is made world-readable before the move, and removed
    /// afterwards whether or not the move succeeded.
    pub fn install(
        &self,
        shell: &Shell,
        credential: Option<&Credential>,
        body: &str,
        destination: &str,
    ) -> Result<(), ProvisionError> {
        let staged = self
            .dir
            .join(format!("logic-installer-{}", uuid::Uuid::new_v4()));
        let _guard = StagedFileGuard {
            path: staged.clone(),
            dry_run: self.dry_run,
        };

        if self.dry_run {
            info!("dry run: would write {} bytes to {}", body.len(), destination);
        } else {
            fs::write(&staged, body)
                .map_err(|e| ProvisionError::io(format!("failed to write {}", staged), e))?;
            let mode = Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::ROTH;
            rustix::fs::chmod(staged.as_std_path(), mode).map_err(|e| {
                ProvisionError::io(format!("failed to set permissions on {}", staged), e.into())
            })?;
            debug!("staged {} at {}", destination, staged);
        }

        shell.run_elevated(&format!("mv {} {}", staged, destination), credential)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(hostname: &str) -> TemplateValues {
        TemplateValues {
            hostname: hostname.to_string(),
            user: "deploy".to_string(),
            app_dir: Utf8PathBuf::from("/home/deploy/logic"),
            program: "logic".to_string(),
            php_socket: "/var/run/php/php8.2-fpm.sock".to_string(),
            php_binary: "php8.2".to_string(),
            worker_log: Utf8PathBuf::from("/home/deploy/logic-worker.log"),
        }
    }

    #[test]
    fn reverse_proxy_site_substitutions() {
        let site = render(TemplateKind::ReverseProxySite, &values("logic.example.com"));
        assert!(site.contains("    server_name logic.example.com;\n"));
        assert!(site.contains("    root /home/deploy/logic/public;\n"));
        assert!(site.contains("fastcgi_pass unix:/var/run/php/php8.2-fpm.sock;"));
        assert!(site.contains("try_files $uri $uri/ /index.php?$query_string;"));
        assert!(site.contains("error_page 404 /index.php;"));
        assert!(!site.contains("{{"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let v = values("logic.example.com");
        assert_eq!(
            render(TemplateKind::ReverseProxySite, &v),
            render(TemplateKind::ReverseProxySite, &v)
        );
    }

    #[test]
    fn hostname_only_changes_server_name() {
        let a = render(TemplateKind::ReverseProxySite, &values("a.example.com"));
        let b = render(TemplateKind::ReverseProxySite, &values("b.example.org"));
        let differing: Vec<(&str, &str)> = a
            .lines()
            .zip(b.lines())
            .filter(|(x, y)| x != y)
            .collect();
        assert_eq!(
            differing,
            vec![("    server_name a.example.com;", "    server_name b.example.org;")]
        );
        assert_eq!(a.lines().count(), b.lines().count());
    }

    #[test]
    fn placeholder_lookalike_values_are_written_literally() {
        let tricky = render(TemplateKind::ReverseProxySite, &values("{{program}}"));
        let plain = render(TemplateKind::ReverseProxySite, &values("logic"));
        assert_ne!(tricky, plain);
        assert!(tricky.contains("    server_name {{program}};\n"));
        assert!(tricky.contains("access_log /var/log/nginx/logic.access.log;"));

        let mut v = values("host");
        v.user = "{{app_dir}}".to_string();
        let conf = render(TemplateKind::SupervisorWorker, &v);
        assert!(conf.contains("user={{app_dir}}\n"));
    }

    #[test]
    fn supervisor_worker_substitutions() {
        let conf = render(TemplateKind::SupervisorWorker, &values("host"));
        let lines: Vec<&str> = conf.lines().collect();
        assert_eq!(lines[0], "[program:logic]");
        assert_eq!(
            lines[1],
            "command=php8.2 /home/deploy/logic/artisan queue:listen redis --sleep=10 --quiet --force --queue=\"logic\""
        );
        assert!(lines.contains(&"autostart=true"));
        assert!(lines.contains(&"autorestart=true"));
        assert!(lines.contains(&"user=deploy"));
        assert!(lines.contains(&"stdout_logfile=/home/deploy/logic-worker.log"));
        assert!(conf.contains("process_name=%(program_name)s_%(process_num)02d"));
    }

    #[test]
    fn kind_display() {
        assert_eq!(TemplateKind::ReverseProxySite.to_string(), "reverse-proxy-site");
        assert_eq!(TemplateKind::SupervisorWorker.to_string(), "supervisor-worker");
    }
}
