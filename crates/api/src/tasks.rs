//! The forum's task types and their message templates.
//!
//! Each task name here is what page handlers put in their
//! [`TaskReport`](crate::middleware::TaskReport). The templates read the
//! event payload (`data.*`), the event path (`link`) and the recipient.

use agora_events::task::{AutoSubscribe, ChannelTemplates, TaskCapabilities, TaskRegistry};
use agora_events::templates::StaticTemplates;

pub const REPLY: &str = "Reply";
pub const NEW_THREAD: &str = "NewThread";
pub const ADD_BLOG: &str = "AddBlog";
pub const ADD_EMAIL: &str = "AddEmail";
pub const FORGOT_PASSWORD: &str = "ForgotPassword";
pub const PERMISSION_ALLOW: &str = "PermissionUserAllow";

/// Register every task type the forum publishes.
pub fn register_forum_tasks(registry: &TaskRegistry) {
    registry.register(
        REPLY,
        TaskCapabilities::default()
            .with_subscribers(ChannelTemplates::named("reply"))
            .with_auto_subscribe(AutoSubscribe::Thread),
    );
    registry.register(
        NEW_THREAD,
        TaskCapabilities::default()
            .with_subscribers(ChannelTemplates::named("new_thread"))
            .with_auto_subscribe(AutoSubscribe::Thread),
    );
    registry.register(
        ADD_BLOG,
        TaskCapabilities::default()
            .with_subscribers(ChannelTemplates::named("blog_added"))
            .with_admins(ChannelTemplates::named("blog_added_admin"))
            .with_auto_subscribe(AutoSubscribe::EventPath),
    );
    registry.register(
        ADD_EMAIL,
        TaskCapabilities::default().with_actor(ChannelTemplates::named("email_added")),
    );
    registry.register(
        FORGOT_PASSWORD,
        TaskCapabilities::default()
            .with_actor(ChannelTemplates::email_only("password_reset"))
            .with_admins(ChannelTemplates::notification_only("password_reset_admin")),
    );
    registry.register(
        PERMISSION_ALLOW,
        TaskCapabilities::default().with_admins(ChannelTemplates::named("permission_granted")),
    );
}

/// Built-in templates for [`register_forum_tasks`].
pub fn forum_templates() -> StaticTemplates {
    StaticTemplates::new()
        .with_email(
            "reply",
            "New reply in {{ data.topic_title }}",
            "Hi {{ recipient.username }},\n\n{{ data.author }} replied in \"{{ data.topic_title }}\".\n\nRead it at {{ link }}\n",
            "<p>Hi {{ recipient.username }},</p><p>{{ data.author }} replied in <a href=\"{{ link }}\">{{ data.topic_title }}</a>.</p>",
        )
        .with_notification("reply", "{{ data.author }} replied to {{ data.topic_title }}")
        .with_email(
            "new_thread",
            "New thread in {{ data.topic_title }}",
            "{{ data.author }} started a thread in \"{{ data.topic_title }}\": {{ link }}\n",
            "<p>{{ data.author }} started a thread in <a href=\"{{ link }}\">{{ data.topic_title }}</a>.</p>",
        )
        .with_notification("new_thread", "{{ data.author }} started a thread in {{ data.topic_title }}")
        .with_email(
            "blog_added",
            "{{ data.author }} posted a blog entry",
            "{{ data.author }} posted a new blog entry: {{ link }}\n",
            "<p>{{ data.author }} posted a <a href=\"{{ link }}\">new blog entry</a>.</p>",
        )
        .with_notification("blog_added", "{{ data.author }} posted a blog entry")
        .with_email(
            "blog_added_admin",
            "Blog entry by {{ data.author }}",
            "New blog entry by {{ data.author }} at {{ link }}\n",
            "",
        )
        .with_notification("blog_added_admin", "Blog entry by {{ data.author }}")
        .with_email(
            "email_added",
            "Email address added",
            "The address {{ data.email }} was added to your account.\n",
            "",
        )
        .with_notification("email_added", "Email address {{ data.email }} added")
        .with_email(
            "password_reset",
            "Password reset requested",
            "A password reset was requested for your account.\n\nFollow {{ data.reset_link }} to choose a new password.\n",
            "",
        )
        .with_notification("password_reset_admin", "Password reset requested for {{ data.username }}")
        .with_email(
            "permission_granted",
            "Permission granted to {{ data.username }}",
            "{{ data.author }} granted {{ data.role }} to {{ data.username }}.\n",
            "",
        )
        .with_notification("permission_granted", "{{ data.username }} was granted {{ data.role }}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_events::templates::{TemplateNamespace, TemplateRenderer};

    #[test]
    fn every_registered_template_exists() {
        let registry = TaskRegistry::new();
        register_forum_tasks(&registry);
        let templates = forum_templates();

        for name in registry.names() {
            let task = registry.get(&name).unwrap();
            let caps = &task.capabilities;
            for channel in [&caps.subscribers, &caps.admins, &caps.actor].into_iter().flatten() {
                if let Some(triple) = &channel.email {
                    assert!(triple.resolves(&templates), "{name}: email {}", triple.html);
                }
                if let Some(notification) = &channel.notification {
                    assert!(
                        templates.exists(TemplateNamespace::Notification, notification),
                        "{name}: notification {notification}"
                    );
                }
            }
        }
        assert_eq!(registry.names().len(), 6);
    }
}
