use chrono::{DateTime, Utc};

use crate::channel::Channel;
use crate::util::time::{format_xmltv_time, programme_window};

/// Guide rendering options.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuideOptions {
    /// Show the streamer's profile image instead of game art for "Just Chatting".
    pub profile_as_just_chatting: bool,
}

/// Title of a channel's current programme.
pub fn programme_title(channel: &Channel) -> String {
    match &channel.broadcast {
        Some(broadcast) => format!(
            "\u{2022} {} Playing {}",
            channel.display_name, broadcast.game_name
        ),
        None => format!("{} Offline", channel.display_name),
    }
}

/// Icon of a channel's current programme.
pub fn programme_icon<'a>(channel: &'a Channel, options: &GuideOptions) -> &'a str {
    if options.profile_as_just_chatting && channel.is_just_chatting() {
        &channel.profile_image_url
    } else {
        channel.game_art_url()
    }
}

/// Generate an XMLTV EPG document with one programme per channel.
///
/// Pure function of the catalog snapshot and the current time.
pub fn generate_epg(channels: &[Channel], now: DateTime<Utc>, options: &GuideOptions) -> String {
    let mut channel_elements = String::new();
    let mut programmes = String::new();

    for channel in channels {
        let channel_id = escape_xml(&channel.display_name);

        channel_elements.push_str(&format!(
            "  <channel id=\"{id}\">\n\
             \x20   <display-name>{name}</display-name>\n\
             \x20   <lcn>{lcn}</lcn>\n\
             \x20   <icon src=\"{icon}\"/>\n\
             \x20 </channel>\n",
            id = channel_id,
            name = channel_id,
            lcn = escape_xml(&channel.id),
            icon = escape_xml(&channel.profile_image_url),
        ));

        let (start, stop) = programme_window(
            channel.broadcast.as_ref().map(|b| b.started_at),
            now,
        );

        let desc_element = channel
            .broadcast
            .as_ref()
            .map(|b| format!("    <desc>{}</desc>\n", escape_xml(&b.title)))
            .unwrap_or_default();

        programmes.push_str(&format!(
            "  <programme start=\"{start}\" stop=\"{stop}\" channel=\"{id}\">\n\
             \x20   <title>{title}</title>\n\
             {desc}\
             \x20   <icon src=\"{icon}\"/>\n\
             \x20 </programme>\n",
            start = format_xmltv_time(&start),
            stop = format_xmltv_time(&stop),
            id = channel_id,
            title = escape_xml(&programme_title(channel)),
            desc = desc_element,
            icon = escape_xml(programme_icon(channel, options)),
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n\
         <tv generator-info-name=\"livetuner\">\n\
         {channels}\
         {programmes}\
         </tv>\n",
        channels = channel_elements,
        programmes = programmes,
    )
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
